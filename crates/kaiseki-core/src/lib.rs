// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Kaiseki media-analysis bot pipeline.
//!
//! This crate provides the foundational trait definitions, error type, and
//! common types used throughout the Kaiseki workspace. The pipeline crates
//! (guard, analysis, compose, delivery, orchestrator) all depend on this
//! crate and nothing else in the workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::KaisekiError;
pub use types::{
    Admission, AnalysisInput, AnalysisOutcome, AnalysisRequest, ContentType, Denial,
    DenialReason, Job, JobId, JobPatch, JobRequest, JobStatus, MediaObject, ProviderAnswer,
};

pub use traits::{AnalysisProvider, DeliveryChannel, MediaStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = KaisekiError::Config("test".into());
        let _storage = KaisekiError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _media = KaisekiError::Media {
            message: "test".into(),
            source: None,
        };
        let _channel = KaisekiError::Channel {
            message: "test".into(),
            source: None,
        };
        let _provider = KaisekiError::Provider {
            message: "test".into(),
            source: None,
        };
        let _timeout = KaisekiError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = KaisekiError::Internal("test".into());
    }

    #[test]
    fn trait_objects_are_usable() {
        // Verify the adapter traits are object-safe: the orchestrator holds
        // them as Arc<dyn Trait>.
        fn _assert_analysis(_: &dyn AnalysisProvider) {}
        fn _assert_delivery(_: &dyn DeliveryChannel) {}
        fn _assert_media(_: &dyn MediaStore) {}
    }
}
