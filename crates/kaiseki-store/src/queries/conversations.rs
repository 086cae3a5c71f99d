// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider conversation continuity, one row per user.

use kaiseki_core::KaisekiError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

/// The stored conversation id for a user, if any.
pub async fn get(db: &Database, user_id: &str) -> Result<Option<String>, KaisekiError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT conversation_id FROM conversations WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store (or replace) the conversation id for a user.
pub async fn set(db: &Database, user_id: &str, conversation_id: &str) -> Result<(), KaisekiError> {
    let user_id = user_id.to_string();
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (user_id, conversation_id)
                 VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET
                     conversation_id = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![user_id, conversation_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_and_get_conversation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        assert!(get(&db, "U1").await.unwrap().is_none());
        set(&db, "U1", "conv-a").await.unwrap();
        assert_eq!(get(&db, "U1").await.unwrap().as_deref(), Some("conv-a"));
        set(&db, "U1", "conv-b").await.unwrap();
        assert_eq!(get(&db, "U1").await.unwrap().as_deref(), Some("conv-b"));

        db.close().await.unwrap();
    }
}
