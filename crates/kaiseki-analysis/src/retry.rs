// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry/backoff policy with pluggable transient classification.
//!
//! One policy object owns the whole decision: how many attempts, how long
//! to wait between them, and which failures are worth retrying. The
//! analysis client is the only consumer; call sites must not grow their own
//! ad hoc retry loops.

use std::time::Duration;

use crate::types::ApiErrorBody;

/// One failed HTTP attempt, as seen by the classifier.
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// Non-2xx response with its body text.
    Http { status: u16, body: String },
    /// Connect failure, timeout, or mid-body abort.
    Network(String),
}

impl AttemptFailure {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            AttemptFailure::Http { status, body } => {
                let body = body.trim();
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                }
            }
            AttemptFailure::Network(detail) => format!("network error: {detail}"),
        }
    }
}

/// Classifier function deciding whether a failure is transient.
pub type TransientClassifier = fn(&AttemptFailure) -> bool;

/// Retry policy: (max attempts, delay schedule, transient classifier).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    classifier: TransientClassifier,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, classifier: TransientClassifier) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            classifier,
        }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a failure may be retried at all.
    pub fn is_transient(&self, failure: &AttemptFailure) -> bool {
        (self.classifier)(failure)
    }

    /// Delay before the given retry (1-based: first retry, second retry...).
    ///
    /// Exponential doubling from the base delay.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// The pipeline's transient classifier.
///
/// Transient: HTTP 429 or 503, a provider-reported `UNAVAILABLE` status
/// string, any body containing "overload" (case-insensitive), and all
/// network-level failures. Everything else is fatal.
pub fn overload_classifier(failure: &AttemptFailure) -> bool {
    match failure {
        AttemptFailure::Network(_) => true,
        AttemptFailure::Http { status, body } => {
            if matches!(status, 429 | 503) {
                return true;
            }
            if body.to_lowercase().contains("overload") {
                return true;
            }
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
                let reported = err.status.as_deref().or(err.code.as_deref());
                if reported == Some("UNAVAILABLE") {
                    return true;
                }
            }
            false
        }
    }
}
