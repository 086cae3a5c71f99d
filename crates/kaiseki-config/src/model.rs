// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Kaiseki pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Every section is optional and defaults to values
//! matching the production deployment.

use serde::{Deserialize, Serialize};

/// Top-level Kaiseki configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides via the `KAISEKI_` prefix.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KaisekiConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Chat platform (LINE Messaging API) settings.
    #[serde(default)]
    pub line: LineConfig,

    /// External analysis provider settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Media object store and capacity settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Per-user daily quota limits.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Response composition caps.
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Fingerprint cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Job orchestration settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "kaiseki".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// LINE Messaging API configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LineConfig {
    /// Channel access token. `None` disables outbound delivery.
    #[serde(default)]
    pub channel_access_token: Option<String>,

    /// Channel secret for webhook signature verification.
    /// `None` skips verification (local development only).
    #[serde(default)]
    pub channel_secret: Option<String>,
}

/// External analysis provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Provider API key. `None` requires environment variable override.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat-messages endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Query text sent alongside media references.
    #[serde(default = "default_media_query")]
    pub media_query: String,

    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum HTTP attempts per analysis call (first try + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the exponential retry schedule, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            media_query: default_media_query(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.dify.ai/v1/chat-messages".to_string()
}

fn default_media_query() -> String {
    "この動画を解析し、要約と重要イベントを返してください。".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("kaiseki").join("kaiseki.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("kaiseki.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Media object store and capacity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Directory holding stored media objects.
    #[serde(default = "default_media_root")]
    pub root_dir: String,

    /// Hard capacity limit in bytes; admissions are denied above this.
    #[serde(default = "default_storage_limit_bytes")]
    pub storage_limit_bytes: u64,

    /// How long a storage-usage snapshot stays fresh, in seconds.
    #[serde(default = "default_usage_cache_secs")]
    pub usage_cache_secs: u64,

    /// Cleanup deletes objects older than this many days.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Cleanup additionally deletes oldest-first until usage is below this.
    #[serde(default = "default_cleanup_target_bytes")]
    pub cleanup_target_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root_dir: default_media_root(),
            storage_limit_bytes: default_storage_limit_bytes(),
            usage_cache_secs: default_usage_cache_secs(),
            max_age_days: default_max_age_days(),
            cleanup_target_bytes: default_cleanup_target_bytes(),
        }
    }
}

fn default_media_root() -> String {
    dirs::data_dir()
        .map(|p| p.join("kaiseki").join("media"))
        .unwrap_or_else(|| std::path::PathBuf::from("media"))
        .to_string_lossy()
        .into_owned()
}

fn default_storage_limit_bytes() -> u64 {
    // ~4.9 GiB, leaving headroom under a 5 GiB bucket quota.
    (4.9 * 1024.0 * 1024.0 * 1024.0) as u64
}

fn default_usage_cache_secs() -> u64 {
    60
}

fn default_max_age_days() -> u32 {
    30
}

fn default_cleanup_target_bytes() -> u64 {
    // 2.5 GiB: half the bucket quota.
    2560 * 1024 * 1024
}

/// Per-user daily quota limits, one count per content type.
///
/// A limit of `None` exempts that content type from quota accounting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    #[serde(default = "default_video_limit")]
    pub video: Option<u32>,

    #[serde(default = "default_image_limit")]
    pub image: Option<u32>,

    #[serde(default = "default_text_limit")]
    pub text: Option<u32>,

    /// Release the reserved quota unit when a job ends in `error`.
    ///
    /// Off by default: a failed job still consumes quota, so retry storms
    /// cannot bypass the daily limit.
    #[serde(default)]
    pub refund_on_failure: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            video: default_video_limit(),
            image: default_image_limit(),
            text: default_text_limit(),
            refund_on_failure: false,
        }
    }
}

fn default_video_limit() -> Option<u32> {
    Some(1)
}

fn default_image_limit() -> Option<u32> {
    Some(3)
}

fn default_text_limit() -> Option<u32> {
    Some(5)
}

/// Response composition caps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeConfig {
    /// Japanese summary cap, in Unicode code points.
    #[serde(default = "default_max_ja_chars")]
    pub max_ja_chars: usize,

    /// English summary cap, in whitespace-delimited words.
    #[serde(default = "default_max_en_words")]
    pub max_en_words: usize,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            max_ja_chars: default_max_ja_chars(),
            max_en_words: default_max_en_words(),
        }
    }
}

fn default_max_ja_chars() -> usize {
    180
}

fn default_max_en_words() -> usize {
    120
}

/// Fingerprint cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache entry time-to-live, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Job orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Hard upper bound on one job's end-to-end execution, in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn default_job_timeout_secs() -> u64 {
    180
}

/// Webhook server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the webhook server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}
