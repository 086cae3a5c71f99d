// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Kaiseki pipeline crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for one analysis job.
///
/// Caller-supplied, usually derived from the inbound message id, so a
/// re-delivered webhook event maps onto the same ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of content a user submitted, used for quota accounting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Image,
    Text,
}

/// Lifecycle state of a job in the ledger.
///
/// Monotonic: `pending -> processing -> {completed, completed_cached, error}`.
/// A delivery failure is recorded as an overlay flag on the terminal state
/// (see [`Job::delivery_failed`]), never as a state of its own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    CompletedCached,
    Error,
}

/// One user-submitted analysis request, as persisted in the job ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Requesting identity as known to this system.
    pub user_id: String,
    /// Identity on the chat platform (push target).
    pub platform_user_id: String,
    /// URL or content pointer handed to the analysis provider.
    /// Time-bounded validity (e.g. a signed URL); `None` for text inputs.
    pub media_reference: Option<String>,
    pub content_type: ContentType,
    pub status: JobStatus,
    /// Set when delivery exhausted both reply and push paths.
    pub delivery_failed: bool,
    pub delivery_error: Option<String>,
    /// Continuity token passed to/from the analysis provider.
    pub conversation_id: Option<String>,
    /// The composed message last sent (or attempted) for this job.
    pub last_message: Option<String>,
    /// Provider usage/diagnostic metadata, stored as JSON.
    pub provider_meta: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub cache_hit: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A merge-patch against a job ledger row.
///
/// Only fields set to `Some` overlay the stored row; everything else keeps
/// its previous value, so later phases never erase earlier phase data.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub delivery_failed: Option<bool>,
    pub delivery_error: Option<String>,
    pub conversation_id: Option<String>,
    pub last_message: Option<String>,
    pub provider_meta: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub cache_hit: Option<bool>,
}

impl JobPatch {
    /// Patch that only moves the job to a new status.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Input handed to the analysis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisInput {
    /// A media reference (signed URL or content pointer).
    Media {
        content_type: ContentType,
        url: String,
    },
    /// A free-form text query.
    Text { query: String },
}

impl AnalysisInput {
    /// The quota content type this input is accounted under.
    pub fn content_type(&self) -> ContentType {
        match self {
            AnalysisInput::Media { content_type, .. } => *content_type,
            AnalysisInput::Text { .. } => ContentType::Text,
        }
    }

    /// Canonical string form used for fingerprint hashing.
    pub fn canonical(&self) -> &str {
        match self {
            AnalysisInput::Media { url, .. } => url,
            AnalysisInput::Text { query } => query,
        }
    }
}

/// A request to the analysis provider.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input: AnalysisInput,
    /// Provider-side end-user identifier.
    pub user: String,
    /// Continuation token from a previous exchange, if any.
    pub conversation_id: Option<String>,
}

/// A successfully parsed provider answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAnswer {
    /// Raw answer text (the composer parses structure out of this).
    pub text: String,
    pub conversation_id: Option<String>,
    /// Usage and diagnostic metadata, numeric fields already coerced.
    pub meta: serde_json::Value,
}

/// Normalized outcome of one analysis call, after retries.
///
/// Transient conditions that survive the whole retry schedule come back as
/// `Overloaded` rather than an error, so the orchestrator can substitute a
/// polite "try again later" message instead of failing the job.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Answer(ProviderAnswer),
    Overloaded,
}

/// Why the admission guard denied a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Operator kill-switch is on.
    Disabled,
    /// Object storage is at capacity.
    Storage,
    /// Per-user daily quota exhausted.
    Quota,
    /// The quota transaction itself failed (store unavailable).
    QuotaError,
}

/// A denial from the admission guard, carrying the user-facing bilingual
/// message and an HTTP-equivalent status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    pub message_jp: String,
    pub message_en: String,
    pub status_code: u16,
}

/// Result of the admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(Denial),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// A discrete inbound request handed to the orchestrator.
///
/// The transport layer has already acknowledged the event by the time this
/// exists; the reply token (if any) is single-use and time-limited.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: JobId,
    pub user_id: String,
    pub platform_user_id: String,
    pub reply_token: Option<String>,
    pub input: AnalysisInput,
}

/// An object in the media store, as seen by capacity metering and cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaObject {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}
