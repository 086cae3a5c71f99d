// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis provider trait for external generative-AI services.

use async_trait::async_trait;

use crate::error::KaisekiError;
use crate::types::{AnalysisOutcome, AnalysisRequest};

/// Adapter for the external analysis service.
///
/// Implementations own their retry/backoff behavior: a return value of
/// [`AnalysisOutcome::Overloaded`] means the transient retry schedule was
/// exhausted, while `Err` means a non-transient failure (bad request, auth)
/// that must not be retried.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Runs one analysis request to completion.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, KaisekiError>;
}
