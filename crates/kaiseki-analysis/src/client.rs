// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the external analysis provider.
//!
//! Provides [`AnalysisClient`] which handles request construction, bearer
//! authentication, per-attempt timeouts, transient-error retry, and
//! normalization of the provider's answer into [`AnalysisOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use kaiseki_config::model::AnalysisConfig;
use kaiseki_core::{
    AnalysisOutcome, AnalysisProvider, AnalysisRequest, KaisekiError, ProviderAnswer,
};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::retry::{overload_classifier, AttemptFailure, RetryPolicy};
use crate::types::{normalize_metadata, ApiErrorBody, ChatRequest, ChatResponse};

/// Answer substituted when the provider responds 2xx with a blank answer,
/// or 500 (which the provider uses for recoverable internal hiccups).
const FALLBACK_ANSWER: &str = "解析の詳細を取得できませんでした。後ほど再度お試しください。";

/// HTTP client for the analysis provider's chat-messages endpoint.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: String,
    media_query: String,
    policy: RetryPolicy,
}

impl AnalysisClient {
    /// Creates a new analysis client from configuration.
    ///
    /// Requires `analysis.api_key` to be set.
    pub fn new(config: &AnalysisConfig) -> Result<Self, KaisekiError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                KaisekiError::Config("analysis.api_key is required for the analysis client".into())
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                KaisekiError::Config(format!("invalid API key header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| KaisekiError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            media_query: config.media_query.clone(),
            policy: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.base_delay_ms),
                overload_classifier,
            ),
        })
    }

    /// Turn a parsed 2xx response into a provider answer.
    fn answer_from_response(
        &self,
        response: ChatResponse,
        request: &AnalysisRequest,
    ) -> ProviderAnswer {
        let text = response
            .answer
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());

        let conversation_id = response
            .conversation_id
            .filter(|c| !c.is_empty())
            .or_else(|| request.conversation_id.clone());

        let meta = response
            .metadata
            .map(normalize_metadata)
            .unwrap_or_else(|| serde_json::json!({}));

        ProviderAnswer {
            text,
            conversation_id,
            meta,
        }
    }

    fn fatal_error(failure: &AttemptFailure) -> KaisekiError {
        let message = match failure {
            AttemptFailure::Http { status, body } => {
                if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
                    format!(
                        "analysis API error ({status} {}): {}",
                        err.code.or(err.status).unwrap_or_default(),
                        err.message.unwrap_or_default()
                    )
                } else {
                    failure.describe()
                }
            }
            AttemptFailure::Network(_) => failure.describe(),
        };
        KaisekiError::Provider {
            message,
            source: None,
        }
    }
}

#[async_trait]
impl AnalysisProvider for AnalysisClient {
    /// Runs one analysis request to completion.
    ///
    /// Transient failures (429/503, provider `UNAVAILABLE`, "overload" body,
    /// network/timeout) are retried on an exponential schedule; exhausting
    /// the schedule yields [`AnalysisOutcome::Overloaded`]. Non-transient
    /// failures terminate immediately, except HTTP 500 which maps to a
    /// fallback answer the way the provider intends it.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, KaisekiError> {
        let wire = ChatRequest::from_request(request, &self.media_query);

        for attempt in 1..=self.policy.max_attempts() {
            if attempt > 1 {
                let delay = self.policy.delay_before_retry(attempt - 1);
                warn!(attempt, ?delay, "retrying analysis request after transient failure");
                tokio::time::sleep(delay).await;
            }

            let failure = match self.client.post(&self.endpoint).json(&wire).send().await {
                Err(e) => AttemptFailure::Network(e.to_string()),
                Ok(response) => {
                    let status = response.status();
                    debug!(status = %status, attempt, "analysis response received");

                    if status.is_success() {
                        let body =
                            response.text().await.map_err(|e| KaisekiError::Provider {
                                message: format!("failed to read analysis response body: {e}"),
                                source: Some(Box::new(e)),
                            })?;
                        let parsed: ChatResponse =
                            serde_json::from_str(&body).map_err(|e| KaisekiError::Provider {
                                message: format!("failed to parse analysis response: {e}"),
                                source: Some(Box::new(e)),
                            })?;
                        return Ok(AnalysisOutcome::Answer(
                            self.answer_from_response(parsed, request),
                        ));
                    }

                    let body = response.text().await.unwrap_or_default();
                    AttemptFailure::Http {
                        status: status.as_u16(),
                        body,
                    }
                }
            };

            if self.policy.is_transient(&failure) {
                warn!(attempt, failure = %failure.describe(), "transient analysis failure");
                continue;
            }

            // The provider reports recoverable internal hiccups as plain 500;
            // those get the fallback answer instead of failing the job.
            if let AttemptFailure::Http { status: 500, body } = &failure {
                warn!(body = %body, "analysis returned 500, substituting fallback answer");
                return Ok(AnalysisOutcome::Answer(ProviderAnswer {
                    text: FALLBACK_ANSWER.to_string(),
                    conversation_id: request.conversation_id.clone(),
                    meta: serde_json::json!({}),
                }));
            }

            return Err(Self::fatal_error(&failure));
        }

        warn!(
            attempts = self.policy.max_attempts(),
            "analysis retries exhausted, reporting overloaded"
        );
        Ok(AnalysisOutcome::Overloaded)
    }
}
