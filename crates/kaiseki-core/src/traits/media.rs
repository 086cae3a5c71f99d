// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store trait for the object storage holding input media.

use async_trait::async_trait;

use crate::error::KaisekiError;
use crate::types::MediaObject;

/// Adapter for the object store holding user-submitted media.
///
/// The admission guard needs only aggregate byte-size enumeration; cleanup
/// additionally needs per-object listing and deletion.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Total bytes consumed by all stored objects (full enumeration).
    async fn total_bytes(&self) -> Result<u64, KaisekiError>;

    /// All stored objects with size and modification time.
    async fn list(&self) -> Result<Vec<MediaObject>, KaisekiError>;

    /// Removes one object by name.
    async fn remove(&self, name: &str) -> Result<(), KaisekiError>;
}
