// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the analysis provider's chat-messages endpoint, and
//! metadata normalization.

use kaiseki_core::{AnalysisInput, AnalysisRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for the chat-messages endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub inputs: Value,
    /// Always `"blocking"`: the pipeline has no use for a partial answer.
    pub response_mode: &'static str,
    pub user: String,
    /// Empty string starts a new conversation.
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
    pub auto_generate_name: bool,
}

/// A media reference attached to a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct FileAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: &'static str,
    pub url: String,
}

impl ChatRequest {
    /// Build the wire request for one analysis call.
    ///
    /// Media inputs carry the configured analysis query plus a remote-url
    /// file attachment; text inputs are sent as the query itself.
    pub fn from_request(request: &AnalysisRequest, media_query: &str) -> Self {
        let (query, files) = match &request.input {
            AnalysisInput::Media { content_type, url } => (
                media_query.to_string(),
                vec![FileAttachment {
                    kind: content_type.to_string(),
                    transfer_method: "remote_url",
                    url: url.clone(),
                }],
            ),
            AnalysisInput::Text { query } => (query.clone(), Vec::new()),
        };

        Self {
            query,
            inputs: serde_json::json!({}),
            response_mode: "blocking",
            user: request.user.clone(),
            conversation_id: request.conversation_id.clone().unwrap_or_default(),
            files,
            auto_generate_name: true,
        }
    }
}

/// Response body from the chat-messages endpoint.
///
/// Every field is optional: the provider has returned answers as missing,
/// empty, and differently-shaped over time, and a parse failure here must
/// not crash the job.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Error body shape for non-2xx responses. Providers vary; all fields are
/// best-effort.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Recursively coerce numeric strings in usage metadata to JSON numbers.
///
/// The provider reports token counts and latencies inconsistently as
/// strings or numbers. Unrecognized fields pass through unchanged so new
/// metadata keys survive without code changes.
pub fn normalize_usage(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return value.clone();
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::Number(i.into());
            }
            if let Ok(f) = trimmed.parse::<f64>()
                && let Some(n) = serde_json::Number::from_f64(f)
            {
                return Value::Number(n);
            }
            value.clone()
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_usage(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Normalize the `usage` field inside a metadata object, leaving the rest
/// of the metadata untouched.
pub fn normalize_metadata(metadata: Value) -> Value {
    match metadata {
        Value::Object(mut map) => {
            if let Some(usage) = map.get("usage") {
                let normalized = normalize_usage(usage);
                map.insert("usage".to_string(), normalized);
            }
            Value::Object(map)
        }
        other => other,
    }
}
