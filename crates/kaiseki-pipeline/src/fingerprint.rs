// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fingerprint keys for the response cache.
//!
//! A fingerprint is a stable hash of a request's semantic content: the
//! content kind, the conversation it belongs to, and the canonical input
//! (media URL or query text). Two jobs with the same fingerprint are the
//! same question and may share an answer.

use kaiseki_core::ContentType;
use sha2::{Digest, Sha256};

/// Compute the cache key for one request.
pub fn cache_key(
    kind: ContentType,
    conversation_id: Option<&str>,
    canonical_input: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(conversation_id.unwrap_or("").as_bytes());
    hasher.update(b":");
    hasher.update(canonical_input.as_bytes());
    hex::encode(hasher.finalize())
}
