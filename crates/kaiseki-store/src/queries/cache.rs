// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response-cache rows.
//!
//! These are raw row operations; TTL interpretation (expired reads as
//! absent, lazy eviction) lives in the pipeline's cache layer.

use kaiseki_core::KaisekiError;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

/// A raw cache row: `(payload_json, expires_at)`.
pub type CacheRow = (String, String);

/// Fetch a cache row by key, expired or not.
pub async fn get(db: &Database, cache_key: &str) -> Result<Option<CacheRow>, KaisekiError> {
    let cache_key = cache_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT payload, expires_at FROM response_cache WHERE cache_key = ?1",
                params![cache_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or overwrite a cache row.
pub async fn put(
    db: &Database,
    cache_key: &str,
    payload: &str,
    expires_at: &str,
) -> Result<(), KaisekiError> {
    let cache_key = cache_key.to_string();
    let payload = payload.to_string();
    let expires_at = expires_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO response_cache (cache_key, payload, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(cache_key) DO UPDATE SET
                     payload = ?2,
                     expires_at = ?3,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![cache_key, payload, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a cache row by key. Deleting a missing key is a no-op.
pub async fn delete(db: &Database, cache_key: &str) -> Result<(), KaisekiError> {
    let cache_key = cache_key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM response_cache WHERE cache_key = ?1",
                params![cache_key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
