// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily quota operations.
//!
//! `reserve` is the one strict atomic read-modify-write in the system: the
//! compare and the increment happen inside a single SQLite transaction, so
//! concurrent admissions for the same (user, day, content type) can never
//! push the count past the limit.

use kaiseki_core::KaisekiError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::models::ContentType;

/// Atomically reserve one quota unit for (user, date, content type).
///
/// Returns `true` if the unit was reserved, `false` if the count already
/// reached `limit`.
pub async fn reserve(
    db: &Database,
    user_id: &str,
    date_key: &str,
    content_type: ContentType,
    limit: u32,
) -> Result<bool, KaisekiError> {
    let user_id = user_id.to_string();
    let date_key = date_key.to_string();
    let content_type = content_type.to_string();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current: u32 = tx
                .query_row(
                    "SELECT count FROM daily_usage
                     WHERE user_id = ?1 AND date_key = ?2 AND content_type = ?3",
                    params![user_id, date_key, content_type],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);

            if current >= limit {
                tx.commit()?;
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO daily_usage (user_id, date_key, content_type, count)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, date_key, content_type) DO UPDATE SET
                     count = ?4,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![user_id, date_key, content_type, current + 1],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release one previously reserved quota unit (refund-on-failure policy).
///
/// Never goes below zero; releasing a unit that was never reserved is a
/// no-op.
pub async fn release(
    db: &Database,
    user_id: &str,
    date_key: &str,
    content_type: ContentType,
) -> Result<(), KaisekiError> {
    let user_id = user_id.to_string();
    let date_key = date_key.to_string();
    let content_type = content_type.to_string();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE daily_usage SET
                     count = MAX(count - 1, 0),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE user_id = ?1 AND date_key = ?2 AND content_type = ?3",
                params![user_id, date_key, content_type],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Current reserved count for (user, date, content type).
pub async fn count(
    db: &Database,
    user_id: &str,
    date_key: &str,
    content_type: ContentType,
) -> Result<u32, KaisekiError> {
    let user_id = user_id.to_string();
    let date_key = date_key.to_string();
    let content_type = content_type.to_string();

    db.connection()
        .call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT count FROM daily_usage
                     WHERE user_id = ?1 AND date_key = ?2 AND content_type = ?3",
                    params![user_id, date_key, content_type],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn reserve_up_to_limit_then_deny() {
        let (db, _dir) = setup_db().await;

        assert!(reserve(&db, "U1", "2026-08-07", ContentType::Video, 1)
            .await
            .unwrap());
        assert!(!reserve(&db, "U1", "2026-08-07", ContentType::Video, 1)
            .await
            .unwrap());
        assert_eq!(
            count(&db, "U1", "2026-08-07", ContentType::Video)
                .await
                .unwrap(),
            1
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn content_types_are_counted_independently() {
        let (db, _dir) = setup_db().await;

        assert!(reserve(&db, "U1", "2026-08-07", ContentType::Video, 1)
            .await
            .unwrap());
        // Video quota exhausted, image quota untouched.
        assert!(reserve(&db, "U1", "2026-08-07", ContentType::Image, 3)
            .await
            .unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn new_day_supersedes_old_counts() {
        let (db, _dir) = setup_db().await;

        assert!(reserve(&db, "U1", "2026-08-06", ContentType::Video, 1)
            .await
            .unwrap());
        // Next day starts from zero.
        assert!(reserve(&db, "U1", "2026-08-07", ContentType::Video, 1)
            .await
            .unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_decrements_but_not_below_zero() {
        let (db, _dir) = setup_db().await;

        reserve(&db, "U1", "2026-08-07", ContentType::Text, 5)
            .await
            .unwrap();
        release(&db, "U1", "2026-08-07", ContentType::Text)
            .await
            .unwrap();
        release(&db, "U1", "2026-08-07", ContentType::Text)
            .await
            .unwrap();
        assert_eq!(
            count(&db, "U1", "2026-08-07", ContentType::Text)
                .await
                .unwrap(),
            0
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_reserves_never_exceed_limit() {
        let (db, _dir) = setup_db().await;
        let limit = 3u32;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                reserve(&db, "U1", "2026-08-07", ContentType::Image, limit)
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, limit);
        assert_eq!(
            count(&db, "U1", "2026-08-07", ContentType::Image)
                .await
                .unwrap(),
            limit
        );

        db.close().await.unwrap();
    }
}
