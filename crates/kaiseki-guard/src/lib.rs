// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission guard: decides whether a new job may begin.
//!
//! Three checks run in order, short-circuiting on the first denial:
//! 1. operator kill-switch
//! 2. storage capacity (cached snapshot with a bounded staleness window)
//! 3. per-user daily quota (atomic compare-and-increment)
//!
//! A successful admission reserves one quota unit even if the downstream
//! job later fails; quota is not refunded on failure unless the
//! `refund_on_failure` policy flag is set. The failure semantics are
//! deliberately asymmetric: the storage check fails open (availability
//! over strict capacity enforcement), the quota check fails closed.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use kaiseki_config::model::{MediaConfig, QuotaConfig};
use kaiseki_core::{Admission, ContentType, Denial, DenialReason, KaisekiError, MediaStore};
use kaiseki_store::{queries, Database};
use regex::Regex;
use tracing::{error, info, warn};

/// Bilingual user-facing denial messages, one pair per reason.
pub mod messages {
    pub const STORAGE_JP: &str = "現在ストレージが満杯です。数日後に再度お試しください。";
    pub const STORAGE_EN: &str = "Storage is full. Please try again in a few days.";

    pub const QUOTA_JP: &str = "本日の無料枠は終了しました。明日また試してください。";
    pub const QUOTA_EN: &str =
        "Your free quota for today has been reached. Please try again tomorrow.";

    pub const DISABLED_JP: &str = "現在混雑のため受付停止中です。しばらく時間をおいて試してください。";
    pub const DISABLED_EN: &str =
        "Service is temporarily unavailable due to high demand. Please try again later.";
}

static PLATFORM_USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^U[0-9a-fA-F]{32}$").expect("valid user id regex"));

/// Whether the string has the shape of a real platform user id.
///
/// Quota is keyed by this id; malformed ids (internal test senders, group
/// sources) bypass quota accounting rather than polluting it.
pub fn is_likely_valid_platform_user_id(user_id: &str) -> bool {
    PLATFORM_USER_ID.is_match(user_id)
}

fn denial(reason: DenialReason, jp: &str, en: &str, status_code: u16) -> Denial {
    Denial {
        reason,
        message_jp: jp.to_string(),
        message_en: en.to_string(),
        status_code,
    }
}

/// The admission guard. Cheap to clone; all state is in the store.
#[derive(Clone)]
pub struct AdmissionGuard {
    db: Database,
    media: Arc<dyn MediaStore>,
    quota: QuotaConfig,
    media_cfg: MediaConfig,
}

impl AdmissionGuard {
    pub fn new(
        db: Database,
        media: Arc<dyn MediaStore>,
        quota: QuotaConfig,
        media_cfg: MediaConfig,
    ) -> Self {
        Self {
            db,
            media,
            quota,
            media_cfg,
        }
    }

    /// Evaluate all guards for one inbound request.
    pub async fn admit(&self, user_id: &str, content_type: ContentType) -> Admission {
        if self.is_processing_disabled().await {
            info!(user_id, "admission denied: kill-switch on");
            return Admission::Denied(denial(
                DenialReason::Disabled,
                messages::DISABLED_JP,
                messages::DISABLED_EN,
                503,
            ));
        }

        if let Some(d) = self.check_storage_capacity().await {
            info!(user_id, "admission denied: storage at capacity");
            return Admission::Denied(d);
        }

        if let Some(d) = self.reserve_daily_quota(user_id, content_type).await {
            info!(user_id, %content_type, reason = %d.reason, "admission denied");
            return Admission::Denied(d);
        }

        Admission::Allowed
    }

    /// Release a previously reserved quota unit.
    ///
    /// Only called by the orchestrator when `refund_on_failure` is enabled
    /// and the job ended in `error`.
    pub async fn release_quota(&self, user_id: &str, content_type: ContentType) {
        if self.limit_for(content_type).is_none() || !is_likely_valid_platform_user_id(user_id) {
            return;
        }
        let date_key = today_key();
        if let Err(e) = queries::quota::release(&self.db, user_id, &date_key, content_type).await {
            error!(user_id, %content_type, error = %e, "failed to release quota unit");
        }
    }

    /// Whether refunds are enabled for failed jobs.
    pub fn refund_on_failure(&self) -> bool {
        self.quota.refund_on_failure
    }

    fn limit_for(&self, content_type: ContentType) -> Option<u32> {
        match content_type {
            ContentType::Video => self.quota.video,
            ContentType::Image => self.quota.image,
            ContentType::Text => self.quota.text,
        }
    }

    /// Kill-switch read. A store error reads as "not disabled" so a flaky
    /// store cannot take the whole service down.
    async fn is_processing_disabled(&self) -> bool {
        match queries::guard::is_disabled(&self.db).await {
            Ok(disabled) => disabled,
            Err(e) => {
                error!(error = %e, "failed to read kill-switch flag");
                false
            }
        }
    }

    /// Storage capacity check. Fails open on any error.
    async fn check_storage_capacity(&self) -> Option<Denial> {
        match self.storage_usage_bytes().await {
            Ok(usage) if usage >= self.media_cfg.storage_limit_bytes => Some(denial(
                DenialReason::Storage,
                messages::STORAGE_JP,
                messages::STORAGE_EN,
                503,
            )),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "storage capacity check failed, admitting anyway");
                None
            }
        }
    }

    /// Current usage from the snapshot if fresh, otherwise recomputed from
    /// the media store (full enumeration) and written back.
    async fn storage_usage_bytes(&self) -> Result<u64, KaisekiError> {
        if let Some((bytes, checked_at)) = queries::guard::usage_snapshot(&self.db).await?
            && let Ok(ts) = DateTime::parse_from_rfc3339(&checked_at)
        {
            let age = Utc::now().signed_duration_since(ts.with_timezone(&Utc));
            if age < Duration::seconds(self.media_cfg.usage_cache_secs as i64) {
                return Ok(bytes);
            }
        }

        let total = self.media.total_bytes().await?;
        let checked_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(e) = queries::guard::write_usage_snapshot(&self.db, total, &checked_at).await {
            warn!(error = %e, "failed to write storage usage snapshot");
        }
        Ok(total)
    }

    /// Quota reservation. Fails closed: a failing transaction denies with
    /// reason `quota_error` rather than letting limits be bypassed.
    async fn reserve_daily_quota(
        &self,
        user_id: &str,
        content_type: ContentType,
    ) -> Option<Denial> {
        let Some(limit) = self.limit_for(content_type) else {
            return None;
        };
        if !is_likely_valid_platform_user_id(user_id) {
            return None;
        }

        let date_key = today_key();
        match queries::quota::reserve(&self.db, user_id, &date_key, content_type, limit).await {
            Ok(true) => None,
            Ok(false) => Some(denial(
                DenialReason::Quota,
                messages::QUOTA_JP,
                messages::QUOTA_EN,
                429,
            )),
            Err(e) => {
                error!(user_id, %content_type, error = %e, "quota transaction failed");
                Some(denial(
                    DenialReason::QuotaError,
                    messages::DISABLED_JP,
                    messages::DISABLED_EN,
                    503,
                ))
            }
        }
    }
}

fn today_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
