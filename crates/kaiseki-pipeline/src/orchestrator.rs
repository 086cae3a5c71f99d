// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end orchestration of one analysis job.
//!
//! State machine: `pending -> processing -> {completed, completed_cached,
//! error}`, with a delivery-failure overlay on the terminal state. Every
//! failure is caught at this boundary; the transport layer has already
//! acknowledged the inbound event, so the only ways out of here are the
//! delivery channel and the job ledger.
//!
//! The user always receives exactly one delivery attempt sequence with a
//! non-empty message, whatever the provider did.

use std::sync::Arc;
use std::time::Duration;

use kaiseki_compose::{build_bilingual_message, Composer};
use kaiseki_config::model::PipelineConfig;
use kaiseki_core::{
    Admission, AnalysisInput, AnalysisOutcome, AnalysisProvider, AnalysisRequest, ContentType,
    DeliveryChannel, DenialReason, JobPatch, JobRequest, JobStatus, KaisekiError,
};
use kaiseki_guard::AdmissionGuard;
use kaiseki_store::{queries, Database};
use tracing::{error, info, warn};

use crate::cache::{CachePayload, FingerprintCache};
use crate::delivery;
use crate::fingerprint;

/// Bilingual fallback messages for failures the user must still hear about.
mod fallback {
    pub const ERROR_JP: &str = "解析中にエラーが発生しました。もう一度お試しください。";
    pub const ERROR_EN: &str = "An error occurred while processing your request. Please try again.";

    pub const TIMEOUT_JP: &str = "解析がタイムアウトしました。時間をおいて再度お試しください。";
    pub const TIMEOUT_EN: &str = "The analysis timed out. Please try again later.";
}

/// Summary of how one job ended, for the caller and for tests. Everything
/// durable is already in the ledger by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Denied(DenialReason),
    Completed { cached: bool },
    Errored,
}

/// Composes guard, cache, provider, composer, delivery, and ledger into the
/// end-to-end flow for one inbound request.
pub struct JobOrchestrator {
    db: Database,
    guard: AdmissionGuard,
    cache: FingerprintCache,
    provider: Arc<dyn AnalysisProvider>,
    channel: Arc<dyn DeliveryChannel>,
    composer: Composer,
    job_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(
        db: Database,
        guard: AdmissionGuard,
        cache: FingerprintCache,
        provider: Arc<dyn AnalysisProvider>,
        channel: Arc<dyn DeliveryChannel>,
        composer: Composer,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            db,
            guard,
            cache,
            provider,
            channel,
            composer,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }

    /// Run one job to completion. Infallible by design: every outcome is
    /// communicated through the delivery channel and the ledger.
    pub async fn handle(&self, request: JobRequest) -> JobOutcome {
        let content_type = request.input.content_type();

        match self.guard.admit(&request.user_id, content_type).await {
            Admission::Denied(denial) => {
                let message = build_bilingual_message(&denial.message_jp, &denial.message_en);
                self.try_deliver(&request, &message).await;
                return JobOutcome::Denied(denial.reason);
            }
            Admission::Allowed => {}
        }

        if let Err(e) = queries::jobs::create(
            &self.db,
            &request.job_id,
            &request.user_id,
            &request.platform_user_id,
            match &request.input {
                AnalysisInput::Media { url, .. } => Some(url.as_str()),
                AnalysisInput::Text { .. } => None,
            },
            content_type,
        )
        .await
        {
            // The ledger is observability, not a gate: still serve the user.
            error!(job_id = %request.job_id, error = %e, "failed to create job record");
        }

        match tokio::time::timeout(self.job_timeout, self.run_admitted(&request, content_type))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(job_id = %request.job_id, timeout = ?self.job_timeout, "job exceeded hard timeout");
                let err = KaisekiError::Timeout {
                    duration: self.job_timeout,
                };
                let message = build_bilingual_message(fallback::TIMEOUT_JP, fallback::TIMEOUT_EN);
                let (delivered, delivery_error) = self.try_deliver(&request, &message).await;
                self.record_patch(
                    &request,
                    JobPatch {
                        status: Some(JobStatus::Error),
                        error_message: Some(err.to_string()),
                        last_message: Some(message),
                        delivery_failed: Some(!delivered),
                        delivery_error,
                        ..JobPatch::default()
                    },
                )
                .await;
                self.maybe_refund(&request, content_type).await;
                JobOutcome::Errored
            }
        }
    }

    async fn run_admitted(&self, request: &JobRequest, content_type: ContentType) -> JobOutcome {
        self.record_patch(request, JobPatch::status(JobStatus::Processing))
            .await;

        // Conversation continuity applies to text chat; media analyses
        // always start their provider exchange fresh.
        let conversation_id = match &request.input {
            AnalysisInput::Text { .. } => {
                match queries::conversations::get(&self.db, &request.user_id).await {
                    Ok(conv) => conv,
                    Err(e) => {
                        warn!(user_id = %request.user_id, error = %e, "conversation lookup failed");
                        None
                    }
                }
            }
            AnalysisInput::Media { .. } => None,
        };

        let key = fingerprint::cache_key(
            content_type,
            conversation_id.as_deref(),
            request.input.canonical(),
        );

        if let Some(cached) = self.cache.get(&key).await {
            info!(job_id = %request.job_id, "serving cached analysis result");
            let (delivered, delivery_error) =
                self.try_deliver(request, &cached.final_message).await;
            self.record_patch(
                request,
                JobPatch {
                    status: Some(JobStatus::CompletedCached),
                    cache_hit: Some(true),
                    conversation_id: cached.conversation_id.clone(),
                    provider_meta: Some(cached.meta.clone()),
                    last_message: Some(cached.final_message.clone()),
                    delivery_failed: Some(!delivered),
                    delivery_error,
                    ..JobPatch::default()
                },
            )
            .await;
            return JobOutcome::Completed { cached: true };
        }

        let analysis_request = AnalysisRequest {
            input: request.input.clone(),
            user: request.user_id.clone(),
            conversation_id: conversation_id.clone(),
        };

        match self.provider.analyze(&analysis_request).await {
            Ok(AnalysisOutcome::Answer(answer)) => {
                let final_message = self.composer.compose(&answer.text);

                if let (AnalysisInput::Text { .. }, Some(conv)) =
                    (&request.input, answer.conversation_id.as_deref())
                    && let Err(e) =
                        queries::conversations::set(&self.db, &request.user_id, conv).await
                {
                    warn!(user_id = %request.user_id, error = %e, "failed to store conversation id");
                }

                let (delivered, delivery_error) = self.try_deliver(request, &final_message).await;
                self.record_patch(
                    request,
                    JobPatch {
                        status: Some(JobStatus::Completed),
                        conversation_id: answer.conversation_id.clone(),
                        provider_meta: Some(answer.meta.clone()),
                        last_message: Some(final_message.clone()),
                        delivery_failed: Some(!delivered),
                        delivery_error,
                        ..JobPatch::default()
                    },
                )
                .await;

                self.cache
                    .put(
                        &key,
                        &CachePayload {
                            final_message,
                            conversation_id: answer.conversation_id,
                            meta: answer.meta,
                        },
                    )
                    .await;

                JobOutcome::Completed { cached: false }
            }

            Ok(AnalysisOutcome::Overloaded) => {
                // Retries are spent; tell the user to come back later. The
                // job itself completed, but an overload notice is not an
                // answer, so nothing is cached.
                info!(job_id = %request.job_id, "provider overloaded, sending retry notice");
                let message = self.composer.overloaded_message();
                let (delivered, delivery_error) = self.try_deliver(request, &message).await;
                self.record_patch(
                    request,
                    JobPatch {
                        status: Some(JobStatus::Completed),
                        last_message: Some(message),
                        delivery_failed: Some(!delivered),
                        delivery_error,
                        ..JobPatch::default()
                    },
                )
                .await;
                JobOutcome::Completed { cached: false }
            }

            Err(e) => self.finish_error(request, content_type, e).await,
        }
    }

    /// Non-transient provider failure: full detail to the log and ledger,
    /// a generic bilingual fallback to the user.
    async fn finish_error(
        &self,
        request: &JobRequest,
        content_type: ContentType,
        err: KaisekiError,
    ) -> JobOutcome {
        error!(job_id = %request.job_id, error = %err, "analysis failed");
        let message = build_bilingual_message(fallback::ERROR_JP, fallback::ERROR_EN);
        let (delivered, delivery_error) = self.try_deliver(request, &message).await;
        self.record_patch(
            request,
            JobPatch {
                status: Some(JobStatus::Error),
                error_message: Some(err.to_string()),
                last_message: Some(message),
                delivery_failed: Some(!delivered),
                delivery_error,
                ..JobPatch::default()
            },
        )
        .await;
        self.maybe_refund(request, content_type).await;
        JobOutcome::Errored
    }

    async fn maybe_refund(&self, request: &JobRequest, content_type: ContentType) {
        if self.guard.refund_on_failure() {
            self.guard
                .release_quota(&request.user_id, content_type)
                .await;
        }
    }

    /// One delivery attempt sequence. Returns whether it landed plus the
    /// recorded error when it did not.
    async fn try_deliver(&self, request: &JobRequest, message: &str) -> (bool, Option<String>) {
        match delivery::deliver(
            self.channel.as_ref(),
            request.reply_token.as_deref(),
            &request.platform_user_id,
            message,
        )
        .await
        {
            Ok(()) => (true, None),
            Err(e) => {
                error!(job_id = %request.job_id, error = %e, "delivery failed on every path");
                (false, Some(e.to_string()))
            }
        }
    }

    async fn record_patch(&self, request: &JobRequest, patch: JobPatch) {
        if let Err(e) = queries::jobs::patch(&self.db, &request.job_id, &patch).await {
            error!(job_id = %request.job_id, error = %e, "failed to patch job record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kaiseki_compose::fallback as compose_fallback;
    use kaiseki_config::model::{ComposeConfig, MediaConfig, QuotaConfig};
    use kaiseki_core::{JobId, MediaStore, ProviderAnswer};
    use kaiseki_store::FsMediaStore;
    use kaiseki_test_utils::{DeliveryVia, MockChannel, MockProvider};
    use tempfile::tempdir;

    const VALID_USER: &str = "U0123456789abcdef0123456789abcdef";
    const ANSWER_JSON: &str =
        r#"{"ja_summary": "フォームは安定しています。", "en_summary": "Your form is stable."}"#;

    struct Fixture {
        orchestrator: JobOrchestrator,
        db: Database,
        provider: Arc<MockProvider>,
        channel: Arc<MockChannel>,
        _dirs: (tempfile::TempDir, tempfile::TempDir),
    }

    async fn fixture() -> Fixture {
        fixture_with(QuotaConfig::default(), PipelineConfig::default()).await
    }

    async fn fixture_with(quota: QuotaConfig, pipeline: PipelineConfig) -> Fixture {
        let db_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let db_path = db_dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let media: Arc<dyn MediaStore> = Arc::new(FsMediaStore::new(media_dir.path()));
        let guard = AdmissionGuard::new(db.clone(), media, quota, MediaConfig::default());
        let cache = FingerprintCache::new(db.clone(), 3600);
        let provider = Arc::new(MockProvider::new());
        let channel = Arc::new(MockChannel::new());

        let orchestrator = JobOrchestrator::new(
            db.clone(),
            guard,
            cache,
            provider.clone(),
            channel.clone(),
            Composer::new(ComposeConfig::default()),
            &pipeline,
        );

        Fixture {
            orchestrator,
            db,
            provider,
            channel,
            _dirs: (db_dir, media_dir),
        }
    }

    fn video_request(job_id: &str, reply_token: Option<&str>) -> JobRequest {
        JobRequest {
            job_id: JobId(job_id.to_string()),
            user_id: VALID_USER.to_string(),
            platform_user_id: VALID_USER.to_string(),
            reply_token: reply_token.map(str::to_string),
            input: AnalysisInput::Media {
                content_type: ContentType::Video,
                url: "https://storage.example/U1/clip.mp4?sig=x".into(),
            },
        }
    }

    fn text_request(job_id: &str, query: &str) -> JobRequest {
        JobRequest {
            job_id: JobId(job_id.to_string()),
            user_id: VALID_USER.to_string(),
            platform_user_id: VALID_USER.to_string(),
            reply_token: None,
            input: AnalysisInput::Text {
                query: query.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn successful_job_completes_and_delivers_via_reply() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;

        let outcome = f.orchestrator.handle(video_request("j1", Some("tok"))).await;
        assert_eq!(outcome, JobOutcome::Completed { cached: false });

        let sent = f.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].via, DeliveryVia::Reply);
        assert_eq!(
            sent[0].text,
            "フォームは安定しています。\n\nYour form is stable."
        );

        let job = queries::jobs::get(&f.db, &JobId("j1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.delivery_failed);
        assert!(!job.cache_hit);
        assert_eq!(job.last_message.as_deref(), Some(sent[0].text.as_str()));

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn identical_request_hits_cache_and_skips_provider() {
        // Raise the video quota so the second submission is admitted and
        // reaches the cache check.
        let quota = QuotaConfig {
            video: Some(5),
            ..QuotaConfig::default()
        };
        let f = fixture_with(quota, PipelineConfig::default()).await;
        f.provider.push_answer(ANSWER_JSON).await;

        let first = f.orchestrator.handle(video_request("j1", None)).await;
        assert_eq!(first, JobOutcome::Completed { cached: false });

        let second = f.orchestrator.handle(video_request("j2", None)).await;
        assert_eq!(second, JobOutcome::Completed { cached: true });

        // The provider ran exactly once.
        assert_eq!(f.provider.calls(), 1);

        // Both messages are byte-identical.
        let sent = f.channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, sent[1].text);

        let job2 = queries::jobs::get(&f.db, &JobId("j2".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job2.status, JobStatus::CompletedCached);
        assert!(job2.cache_hit);

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn quota_denial_notifies_user_and_creates_no_job() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;

        // Daily video limit is 1.
        assert_eq!(
            f.orchestrator.handle(video_request("j1", None)).await,
            JobOutcome::Completed { cached: false }
        );

        // Second video: same user, different content, same day.
        let mut request = video_request("j2", None);
        request.input = AnalysisInput::Media {
            content_type: ContentType::Video,
            url: "https://storage.example/U1/other.mp4".into(),
        };
        let outcome = f.orchestrator.handle(request).await;
        assert_eq!(outcome, JobOutcome::Denied(DenialReason::Quota));

        // Exactly one denial message, bilingual and non-empty.
        let sent = f.channel.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].text.contains("\n\n"));
        assert!(!sent[1].text.is_empty());

        // Denied requests never enter the ledger.
        assert!(queries::jobs::get(&f.db, &JobId("j2".into()))
            .await
            .unwrap()
            .is_none());

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fatal_provider_error_marks_job_error_but_still_delivers() {
        let f = fixture().await;
        f.provider.push_fatal("analysis API error (401): bad key").await;

        let outcome = f.orchestrator.handle(video_request("j1", None)).await;
        assert_eq!(outcome, JobOutcome::Errored);

        // The user got exactly one non-empty fallback, not the raw error.
        let sent = f.channel.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].text.is_empty());
        assert!(!sent[0].text.contains("bad key"));

        let job = queries::jobs::get(&f.db, &JobId("j1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.unwrap().contains("bad key"));
        assert_eq!(job.last_message.as_deref(), Some(sent[0].text.as_str()));

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn overloaded_provider_sends_retry_notice_without_caching() {
        let f = fixture().await;
        f.provider.push_overloaded().await;
        f.provider.push_answer(ANSWER_JSON).await;

        let first = f.orchestrator.handle(text_request("j1", "hello")).await;
        assert_eq!(first, JobOutcome::Completed { cached: false });

        let sent = f.channel.sent();
        assert!(sent[0].text.contains(compose_fallback::OVERLOAD_JP));
        assert!(sent[0].text.contains(compose_fallback::OVERLOAD_EN));

        // The overload notice was not cached: the same request runs the
        // provider again.
        let second = f.orchestrator.handle(text_request("j2", "hello")).await;
        assert_eq!(second, JobOutcome::Completed { cached: false });
        assert_eq!(f.provider.calls(), 2);

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reply_failure_falls_back_to_push_without_flagging_the_job() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;
        f.channel.fail_replies();

        let outcome = f.orchestrator.handle(video_request("j1", Some("tok"))).await;
        assert_eq!(outcome, JobOutcome::Completed { cached: false });

        assert_eq!(f.channel.sent_via(DeliveryVia::Reply).len(), 1);
        assert_eq!(f.channel.sent_via(DeliveryVia::Push).len(), 1);

        let job = queries::jobs::get(&f.db, &JobId("j1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.delivery_failed, "push fallback succeeded");

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn total_delivery_failure_sets_overlay_flag_and_keeps_result() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;
        f.channel.fail_replies();
        f.channel.fail_pushes();

        let outcome = f.orchestrator.handle(video_request("j1", Some("tok"))).await;
        // The analysis result stands; only delivery is flagged.
        assert_eq!(outcome, JobOutcome::Completed { cached: false });

        let job = queries::jobs::get(&f.db, &JobId("j1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.delivery_failed);
        assert!(job.delivery_error.is_some());
        // The composed message is retained for inspection or manual resend.
        assert!(job.last_message.is_some());

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn text_answer_stores_conversation_for_continuity() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;

        f.orchestrator.handle(text_request("j1", "hello")).await;

        let conv = queries::conversations::get(&f.db, VALID_USER)
            .await
            .unwrap();
        assert_eq!(conv.as_deref(), Some("mock-conv"));

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn media_answer_does_not_touch_conversation_map() {
        let f = fixture().await;
        f.provider.push_answer(ANSWER_JSON).await;

        f.orchestrator.handle(video_request("j1", None)).await;

        assert!(queries::conversations::get(&f.db, VALID_USER)
            .await
            .unwrap()
            .is_none());

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn job_timeout_ends_in_error_with_timeout_message() {
        struct SlowProvider;

        #[async_trait]
        impl AnalysisProvider for SlowProvider {
            async fn analyze(
                &self,
                _request: &AnalysisRequest,
            ) -> Result<AnalysisOutcome, KaisekiError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AnalysisOutcome::Answer(ProviderAnswer {
                    text: "too late".into(),
                    conversation_id: None,
                    meta: serde_json::json!({}),
                }))
            }
        }

        let db_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let db = Database::open(db_dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let media: Arc<dyn MediaStore> = Arc::new(FsMediaStore::new(media_dir.path()));
        let guard = AdmissionGuard::new(
            db.clone(),
            media,
            QuotaConfig::default(),
            MediaConfig::default(),
        );
        let channel = Arc::new(MockChannel::new());
        let orchestrator = JobOrchestrator {
            db: db.clone(),
            guard,
            cache: FingerprintCache::new(db.clone(), 3600),
            provider: Arc::new(SlowProvider),
            channel: channel.clone(),
            composer: Composer::new(ComposeConfig::default()),
            job_timeout: Duration::from_millis(50),
        };

        let outcome = orchestrator.handle(video_request("j1", None)).await;
        assert_eq!(outcome, JobOutcome::Errored);

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains(fallback::TIMEOUT_EN));

        let job = queries::jobs::get(&db, &JobId("j1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.unwrap().contains("timed out"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn refund_policy_releases_quota_on_error() {
        let quota = QuotaConfig {
            refund_on_failure: true,
            ..QuotaConfig::default()
        };
        let f = fixture_with(quota, PipelineConfig::default()).await;

        f.provider.push_fatal("boom").await;
        f.provider.push_answer(ANSWER_JSON).await;

        // First video job fails; with refunds on, the unit comes back.
        assert_eq!(
            f.orchestrator.handle(video_request("j1", None)).await,
            JobOutcome::Errored
        );
        // Limit is 1, yet the second video is admitted.
        assert_eq!(
            f.orchestrator.handle(video_request("j2", None)).await,
            JobOutcome::Completed { cached: false }
        );

        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn default_policy_keeps_quota_spent_on_error() {
        let f = fixture().await;

        f.provider.push_fatal("boom").await;

        assert_eq!(
            f.orchestrator.handle(video_request("j1", None)).await,
            JobOutcome::Errored
        );
        // The failed job still consumed the daily video unit.
        assert_eq!(
            f.orchestrator.handle(video_request("j2", None)).await,
            JobOutcome::Denied(DenialReason::Quota)
        );

        f.db.close().await.unwrap();
    }
}
