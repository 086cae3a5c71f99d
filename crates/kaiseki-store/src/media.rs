// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem-backed media store and retention cleanup.
//!
//! Media objects live as plain files under a configured root directory,
//! named `<user_id>/<message_id>.<ext>`. The admission guard only ever asks
//! for the aggregate byte size; cleanup walks the same listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use kaiseki_core::{KaisekiError, MediaObject, MediaStore};
use tracing::{info, warn};

/// Media store rooted at a local directory.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn media_err(message: String, source: std::io::Error) -> KaisekiError {
        KaisekiError::Media {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Walk the root directory, calling `visit` for each regular file.
    async fn walk<F>(&self, mut visit: F) -> Result<(), KaisekiError>
    where
        F: FnMut(MediaObject),
    {
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // A missing root means zero usage, not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir == self.root => {
                    return Ok(());
                }
                Err(e) => {
                    return Err(Self::media_err(format!("cannot list {}", dir.display()), e))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::media_err(format!("cannot read {}", dir.display()), e))?
            {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| Self::media_err(format!("cannot stat {}", path.display()), e))?;

                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }

                let name = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                let modified_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                visit(MediaObject {
                    name,
                    size_bytes: metadata.len(),
                    modified_at,
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn total_bytes(&self) -> Result<u64, KaisekiError> {
        let mut total = 0u64;
        self.walk(|obj| total += obj.size_bytes).await?;
        Ok(total)
    }

    async fn list(&self) -> Result<Vec<MediaObject>, KaisekiError> {
        let mut objects = Vec::new();
        self.walk(|obj| objects.push(obj)).await?;
        Ok(objects)
    }

    async fn remove(&self, name: &str) -> Result<(), KaisekiError> {
        if Path::new(name)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(KaisekiError::Media {
                message: format!("refusing to remove path with parent components: {name}"),
                source: None,
            });
        }
        let path = self.root.join(name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::media_err(format!("cannot remove {}", path.display()), e))
    }
}

/// Result of one retention cleanup run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub deleted_bytes: u64,
    pub remaining_bytes: u64,
}

/// Delete media past the retention age, then oldest-first until total usage
/// is at or below `target_bytes`.
///
/// Individual deletion failures are logged and skipped; one undeletable
/// object must not wedge the whole run.
pub async fn cleanup(
    store: &dyn MediaStore,
    max_age: Duration,
    target_bytes: u64,
) -> Result<CleanupReport, KaisekiError> {
    let mut objects = store.list().await?;
    objects.sort_by_key(|o| o.modified_at);

    let total: u64 = objects.iter().map(|o| o.size_bytes).sum();
    let cutoff = Utc::now() - max_age;
    let mut report = CleanupReport {
        remaining_bytes: total,
        ..CleanupReport::default()
    };

    for obj in &objects {
        let over_target = report.remaining_bytes > target_bytes;
        let expired = obj.modified_at < cutoff;
        if !expired && !over_target {
            break;
        }
        match store.remove(&obj.name).await {
            Ok(()) => {
                report.deleted_count += 1;
                report.deleted_bytes += obj.size_bytes;
                report.remaining_bytes -= obj.size_bytes;
            }
            Err(e) => {
                warn!(name = %obj.name, error = %e, "cleanup: failed to remove media object");
            }
        }
    }

    info!(
        deleted = report.deleted_count,
        deleted_bytes = report.deleted_bytes,
        remaining_bytes = report.remaining_bytes,
        "media cleanup finished"
    );
    Ok(report)
}
