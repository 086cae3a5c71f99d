// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job ledger operations.
//!
//! The ledger is append-then-patch: `create` registers (or re-registers) a
//! job at admission, and every later phase applies a merge-patch where only
//! the fields present in the patch overlay the stored row. Earlier phase
//! data is never lost to a full overwrite.

use std::str::FromStr;

use kaiseki_core::KaisekiError;
use rusqlite::{params, OptionalExtension};

use crate::models::{ContentType, Job, JobId, JobPatch, JobStatus};

use crate::database::Database;

/// Register a new job in `pending` state.
///
/// Re-submitting the same job id resets the row to `pending` (last write
/// wins); the original `created_at` is kept.
pub async fn create(
    db: &Database,
    job_id: &JobId,
    user_id: &str,
    platform_user_id: &str,
    media_reference: Option<&str>,
    content_type: ContentType,
) -> Result<(), KaisekiError> {
    let job_id = job_id.0.clone();
    let user_id = user_id.to_string();
    let platform_user_id = platform_user_id.to_string();
    let media_reference = media_reference.map(str::to_string);
    let content_type = content_type.to_string();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO jobs (job_id, user_id, platform_user_id, media_reference, content_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(job_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     platform_user_id = excluded.platform_user_id,
                     media_reference = excluded.media_reference,
                     content_type = excluded.content_type,
                     status = 'pending',
                     delivery_failed = 0,
                     delivery_error = NULL,
                     error_message = NULL,
                     cache_hit = 0,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![job_id, user_id, platform_user_id, media_reference, content_type],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a merge-patch to a job row.
///
/// Fields left `None` in the patch keep their stored value (COALESCE
/// overlay). Patching an unknown job id is a no-op.
pub async fn patch(db: &Database, job_id: &JobId, patch: &JobPatch) -> Result<(), KaisekiError> {
    let job_id = job_id.0.clone();
    let status = patch.status.map(|s| s.to_string());
    let delivery_failed = patch.delivery_failed.map(i64::from);
    let delivery_error = patch.delivery_error.clone();
    let conversation_id = patch.conversation_id.clone();
    let last_message = patch.last_message.clone();
    let provider_meta = patch.provider_meta.as_ref().map(|m| m.to_string());
    let error_message = patch.error_message.clone();
    let cache_hit = patch.cache_hit.map(i64::from);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET
                     status = COALESCE(?2, status),
                     delivery_failed = COALESCE(?3, delivery_failed),
                     delivery_error = COALESCE(?4, delivery_error),
                     conversation_id = COALESCE(?5, conversation_id),
                     last_message = COALESCE(?6, last_message),
                     provider_meta = COALESCE(?7, provider_meta),
                     error_message = COALESCE(?8, error_message),
                     cache_hit = COALESCE(?9, cache_hit),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1",
                params![
                    job_id,
                    status,
                    delivery_failed,
                    delivery_error,
                    conversation_id,
                    last_message,
                    provider_meta,
                    error_message,
                    cache_hit,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch a job by id.
pub async fn get(db: &Database, job_id: &JobId) -> Result<Option<Job>, KaisekiError> {
    let job_id = job_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT job_id, user_id, platform_user_id, media_reference, content_type,
                        status, delivery_failed, delivery_error, conversation_id,
                        last_message, provider_meta, error_message, cache_hit,
                        created_at, updated_at
                 FROM jobs WHERE job_id = ?1",
                params![job_id],
                row_to_job,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<Job, rusqlite::Error> {
    let content_type: String = row.get(4)?;
    let status: String = row.get(5)?;
    let provider_meta: Option<String> = row.get(10)?;

    Ok(Job {
        job_id: JobId(row.get(0)?),
        user_id: row.get(1)?,
        platform_user_id: row.get(2)?,
        media_reference: row.get(3)?,
        content_type: ContentType::from_str(&content_type).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        status: JobStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        delivery_failed: row.get::<_, i64>(6)? != 0,
        delivery_error: row.get(7)?,
        conversation_id: row.get(8)?,
        last_message: row.get(9)?,
        provider_meta: provider_meta
            .map(|m| {
                serde_json::from_str(&m).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        10,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
            })
            .transpose()?,
        error_message: row.get(11)?,
        cache_hit: row.get::<_, i64>(12)? != 0,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
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

    fn job_id(s: &str) -> JobId {
        JobId(s.to_string())
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (db, _dir) = setup_db().await;
        let id = job_id("msg-1");

        create(
            &db,
            &id,
            "U0123",
            "U0123",
            Some("https://storage.example/v.mp4"),
            ContentType::Video,
        )
        .await
        .unwrap();

        let job = get(&db, &id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.content_type, ContentType::Video);
        assert_eq!(job.media_reference.as_deref(), Some("https://storage.example/v.mp4"));
        assert!(!job.delivery_failed);
        assert!(!job.cache_hit);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn patch_overlays_only_present_fields() {
        let (db, _dir) = setup_db().await;
        let id = job_id("msg-2");
        create(&db, &id, "U1", "U1", None, ContentType::Text)
            .await
            .unwrap();

        patch(
            &db,
            &id,
            &JobPatch {
                status: Some(JobStatus::Processing),
                conversation_id: Some("conv-1".into()),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();

        // Second patch leaves conversation_id untouched.
        patch(
            &db,
            &id,
            &JobPatch {
                status: Some(JobStatus::Completed),
                last_message: Some("done".into()),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();

        let job = get(&db, &id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(job.last_message.as_deref(), Some("done"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn recreate_resets_to_pending_but_keeps_created_at() {
        let (db, _dir) = setup_db().await;
        let id = job_id("msg-3");
        create(&db, &id, "U1", "U1", None, ContentType::Text)
            .await
            .unwrap();
        patch(&db, &id, &JobPatch::status(JobStatus::Error))
            .await
            .unwrap();
        let first = get(&db, &id).await.unwrap().unwrap();

        create(&db, &id, "U1", "U1", None, ContentType::Text)
            .await
            .unwrap();
        let second = get(&db, &id).await.unwrap().unwrap();
        assert_eq!(second.status, JobStatus::Pending);
        assert_eq!(second.created_at, first.created_at);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn provider_meta_round_trips_as_json() {
        let (db, _dir) = setup_db().await;
        let id = job_id("msg-4");
        create(&db, &id, "U1", "U1", None, ContentType::Image)
            .await
            .unwrap();

        let meta = serde_json::json!({"usage": {"total_tokens": 42}});
        patch(
            &db,
            &id,
            &JobPatch {
                provider_meta: Some(meta.clone()),
                ..JobPatch::default()
            },
        )
        .await
        .unwrap();

        let job = get(&db, &id).await.unwrap().unwrap();
        assert_eq!(job.provider_meta, Some(meta));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_job_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, &job_id("nope")).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
