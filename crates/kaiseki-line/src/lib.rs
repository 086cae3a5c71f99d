// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LINE Messaging API delivery channel adapter.
//!
//! Implements [`DeliveryChannel`] over the platform's two delivery
//! primitives: reply-to-event (single-use, time-limited reply token) and
//! push-to-identity (stable user id, usable at any time). The
//! reply-then-push fallback policy lives in the pipeline; this adapter only
//! speaks the wire protocol.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use kaiseki_config::model::LineConfig;
use kaiseki_core::{DeliveryChannel, KaisekiError};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

/// Base URL for the LINE Messaging API.
const API_BASE_URL: &str = "https://api.line.me";

/// Reply token the platform uses for webhook verification events. Replying
/// to it always fails; it must be treated as absent.
pub const VERIFY_REPLY_TOKEN: &str = "00000000000000000000000000000000";

static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^U[0-9a-fA-F]{32}$").expect("valid user id regex"));

/// Delivery channel speaking the LINE Messaging API.
#[derive(Debug, Clone)]
pub struct LineChannel {
    client: reqwest::Client,
    base_url: String,
}

impl LineChannel {
    /// Creates a new LINE channel adapter.
    ///
    /// Requires `line.channel_access_token` to be set and non-empty.
    pub fn new(config: &LineConfig) -> Result<Self, KaisekiError> {
        let token = config
            .channel_access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                KaisekiError::Config(
                    "line.channel_access_token is required for the LINE adapter".into(),
                )
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                KaisekiError::Config(format!("invalid channel access token: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| KaisekiError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn post_message(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        what: &str,
    ) -> Result<(), KaisekiError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response =
            self.client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| KaisekiError::Channel {
                    message: format!("{what} request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

        let status = response.status();
        if status.is_success() {
            debug!(%status, what, "message delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(KaisekiError::Channel {
            message: format!("{what} error {status}: {body}"),
            source: None,
        })
    }
}

#[async_trait]
impl DeliveryChannel for LineChannel {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), KaisekiError> {
        self.post_message(
            "/v2/bot/message/reply",
            serde_json::json!({
                "replyToken": reply_token,
                "messages": [{"type": "text", "text": text}],
            }),
            "reply",
        )
        .await
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), KaisekiError> {
        if !self.is_valid_user_id(user_id) {
            return Err(KaisekiError::Channel {
                message: format!("refusing push to malformed user id `{user_id}`"),
                source: None,
            });
        }
        self.post_message(
            "/v2/bot/message/push",
            serde_json::json!({
                "to": user_id,
                "messages": [{"type": "text", "text": text}],
            }),
            "push",
        )
        .await
    }

    fn is_valid_user_id(&self, user_id: &str) -> bool {
        USER_ID.is_match(user_id)
    }

    fn is_placeholder_reply_token(&self, token: &str) -> bool {
        token.is_empty() || token == VERIFY_REPLY_TOKEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_USER: &str = "U0123456789abcdef0123456789abcdef";

    fn test_channel(base_url: &str) -> LineChannel {
        LineChannel::new(&LineConfig {
            channel_access_token: Some("test-token".into()),
            channel_secret: None,
        })
        .unwrap()
        .with_base_url(base_url.to_string())
    }

    #[test]
    fn new_requires_access_token() {
        assert!(LineChannel::new(&LineConfig::default()).is_err());
        assert!(LineChannel::new(&LineConfig {
            channel_access_token: Some(String::new()),
            channel_secret: None,
        })
        .is_err());
    }

    #[tokio::test]
    async fn reply_posts_to_reply_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "replyToken": "tok-1",
                "messages": [{"type": "text", "text": "hello"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = test_channel(&server.uri());
        channel.reply("tok-1", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn push_posts_to_push_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/push"))
            .and(body_partial_json(serde_json::json!({
                "to": VALID_USER,
                "messages": [{"type": "text", "text": "result"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = test_channel(&server.uri());
        channel.push(VALID_USER, "result").await.unwrap();
    }

    #[tokio::test]
    async fn reply_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "Invalid reply token"
            })))
            .mount(&server)
            .await;

        let channel = test_channel(&server.uri());
        let err = channel.reply("expired", "hello").await.unwrap_err();
        assert!(err.to_string().contains("Invalid reply token"));
    }

    #[tokio::test]
    async fn push_refuses_malformed_user_id() {
        let server = MockServer::start().await;
        // No mock mounted: a request would fail the test anyway.
        let channel = test_channel(&server.uri());
        assert!(channel.push("group-123", "hello").await.is_err());
    }

    #[test]
    fn placeholder_reply_token_detection() {
        let channel = LineChannel::new(&LineConfig {
            channel_access_token: Some("t".into()),
            channel_secret: None,
        })
        .unwrap();
        assert!(channel.is_placeholder_reply_token(VERIFY_REPLY_TOKEN));
        assert!(channel.is_placeholder_reply_token(""));
        assert!(!channel.is_placeholder_reply_token("real-token"));
    }

    #[test]
    fn user_id_validation() {
        let channel = LineChannel::new(&LineConfig {
            channel_access_token: Some("t".into()),
            channel_secret: None,
        })
        .unwrap();
        assert!(channel.is_valid_user_id(VALID_USER));
        assert!(!channel.is_valid_user_id("U123"));
        assert!(!channel.is_valid_user_id(""));
    }
}
