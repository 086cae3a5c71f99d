// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fingerprint cache over the response-cache store rows.
//!
//! The cache is not a correctness boundary: a miss (including any read
//! error) is always safe to treat as "never computed", and writes are
//! best-effort. Entries past their expiry read as absent and are lazily
//! deleted.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use kaiseki_store::{queries, Database};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A fully-formed cached answer: only written after a job reached terminal
/// success, so replaying it needs no further processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePayload {
    pub final_message: String,
    pub conversation_id: Option<String>,
    pub meta: serde_json::Value,
}

/// TTL cache keyed by request fingerprints.
#[derive(Clone)]
pub struct FingerprintCache {
    db: Database,
    ttl: Duration,
}

impl FingerprintCache {
    pub fn new(db: Database, ttl_secs: u64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Look up a payload. Expired or undecodable entries are deleted
    /// best-effort and read as absent; store errors read as a miss.
    pub async fn get(&self, key: &str) -> Option<CachePayload> {
        let row = match queries::cache::get(&self.db, key).await {
            Ok(row) => row?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let (payload_json, expires_at) = row;
        let expired = DateTime::parse_from_rfc3339(&expires_at)
            .map(|ts| ts.with_timezone(&Utc) < Utc::now())
            .unwrap_or(true);
        if expired {
            self.evict(key).await;
            return None;
        }

        match serde_json::from_str(&payload_json) {
            Ok(payload) => {
                debug!(key, "cache hit");
                Some(payload)
            }
            Err(e) => {
                warn!(key, error = %e, "cache payload undecodable, evicting");
                self.evict(key).await;
                None
            }
        }
    }

    /// Store a payload with the configured TTL. Failures are logged, not
    /// surfaced: a missed write only costs a future recomputation.
    pub async fn put(&self, key: &str, payload: &CachePayload) {
        let expires_at = (Utc::now() + self.ttl).to_rfc3339_opts(SecondsFormat::Millis, true);
        let payload_json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "cache payload serialization failed");
                return;
            }
        };
        if let Err(e) = queries::cache::put(&self.db, key, &payload_json, &expires_at).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = queries::cache::delete(&self.db, key).await {
            warn!(key, error = %e, "cache eviction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn payload(message: &str) -> CachePayload {
        CachePayload {
            final_message: message.to_string(),
            conversation_id: Some("conv-1".into()),
            meta: serde_json::json!({"usage": {"total_tokens": 9}}),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (db, _dir) = setup().await;
        let cache = FingerprintCache::new(db.clone(), 3600);

        assert!(cache.get("k1").await.is_none());
        cache.put("k1", &payload("hello\n\nworld")).await;
        assert_eq!(cache.get("k1").await, Some(payload("hello\n\nworld")));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent_and_is_evicted() {
        let (db, _dir) = setup().await;
        let cache = FingerprintCache::new(db.clone(), 3600);

        // Insert a row that expired an hour ago.
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Millis, true);
        let json = serde_json::to_string(&payload("stale")).unwrap();
        queries::cache::put(&db, "k1", &json, &past).await.unwrap();

        assert!(cache.get("k1").await.is_none());
        // Lazily deleted: the raw row is gone too.
        assert!(queries::cache::get(&db, "k1").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_payload_reads_as_absent() {
        let (db, _dir) = setup().await;
        let cache = FingerprintCache::new(db.clone(), 3600);

        let future = (Utc::now() + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Millis, true);
        queries::cache::put(&db, "k1", "{not json", &future)
            .await
            .unwrap();

        assert!(cache.get("k1").await.is_none());

        db.close().await.unwrap();
    }
}
