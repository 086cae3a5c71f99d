// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kill-switch flag and storage-usage snapshot rows.
//!
//! Both are single-row documents read with a bounded staleness window; they
//! are deliberately not in-process globals because executions are stateless
//! and may run on many workers at once.

use kaiseki_core::KaisekiError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

/// Whether the operator kill-switch is on.
///
/// A missing row reads as "not disabled".
pub async fn is_disabled(db: &Database) -> Result<bool, KaisekiError> {
    db.connection()
        .call(|conn| {
            Ok(conn
                .query_row(
                    "SELECT is_disabled FROM guard_flag WHERE id = 1",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .unwrap_or(0)
                != 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip the operator kill-switch.
pub async fn set_disabled(db: &Database, disabled: bool) -> Result<(), KaisekiError> {
    let disabled = i64::from(disabled);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO guard_flag (id, is_disabled, updated_at)
                 VALUES (1, ?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(id) DO UPDATE SET
                     is_disabled = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![disabled],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The cached storage-usage snapshot: `(total_bytes, checked_at)`.
///
/// `None` means no snapshot was ever recorded (always stale).
pub async fn usage_snapshot(db: &Database) -> Result<Option<(u64, String)>, KaisekiError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT total_bytes, checked_at FROM storage_usage WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Overwrite the storage-usage snapshot.
pub async fn write_usage_snapshot(
    db: &Database,
    total_bytes: u64,
    checked_at: &str,
) -> Result<(), KaisekiError> {
    let total_bytes = total_bytes as i64;
    let checked_at = checked_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO storage_usage (id, total_bytes, checked_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                     total_bytes = ?1,
                     checked_at = ?2",
                params![total_bytes, checked_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
