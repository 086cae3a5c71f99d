// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook server: the thin front door of the pipeline.
//!
//! Inbound events are signature-verified, acknowledged with exactly one
//! `200 OK` per delivery, and handed to the orchestrator on a spawned task
//! so the transport never waits on (or sees) analysis work. Any failure
//! after the acknowledgment is communicated solely through the delivery
//! channel and the job ledger.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use hmac::{Hmac, Mac};
use kaiseki_analysis::AnalysisClient;
use kaiseki_compose::Composer;
use kaiseki_config::KaisekiConfig;
use kaiseki_core::{
    AnalysisInput, AnalysisProvider, ContentType, DeliveryChannel, JobId, JobRequest,
    KaisekiError, MediaStore,
};
use kaiseki_guard::AdmissionGuard;
use kaiseki_line::{LineChannel, VERIFY_REPLY_TOKEN};
use kaiseki_pipeline::{FingerprintCache, JobOrchestrator};
use kaiseki_store::{Database, FsMediaStore};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<JobOrchestrator>,
    db: Database,
    channel_secret: Option<String>,
}

/// Build the pipeline from config and serve the webhook until shutdown.
pub async fn run(config: KaisekiConfig) -> Result<(), KaisekiError> {
    let db = Database::open(&config.storage.database_path).await?;
    let media: Arc<dyn MediaStore> = Arc::new(FsMediaStore::new(&config.media.root_dir));

    let guard = AdmissionGuard::new(
        db.clone(),
        media,
        config.quota.clone(),
        config.media.clone(),
    );
    let cache = FingerprintCache::new(db.clone(), config.cache.ttl_secs);
    let provider: Arc<dyn AnalysisProvider> = Arc::new(AnalysisClient::new(&config.analysis)?);
    let channel: Arc<dyn DeliveryChannel> = Arc::new(LineChannel::new(&config.line)?);
    let composer = Composer::new(config.compose.clone());

    let orchestrator = Arc::new(JobOrchestrator::new(
        db.clone(),
        guard,
        cache,
        provider,
        channel,
        composer,
        &config.pipeline,
    ));

    let state = AppState {
        orchestrator,
        db,
        channel_secret: config.line.channel_secret.clone(),
    };

    let app = router(state);
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KaisekiError::Internal(format!("cannot bind {addr}: {e}")))?;

    info!(%addr, "webhook server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| KaisekiError::Internal(format!("server error: {e}")))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    let ping = state
        .db
        .connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT 1", [], |row| row.get(0))
        })
        .await;
    match ping {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Webhook entry point.
///
/// Always answers `200 OK` for well-formed deliveries, before any pipeline
/// work runs; only a bad signature or unparsable body is rejected.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unparsable webhook body");
            return (StatusCode::BAD_REQUEST, "bad request");
        }
    };

    // The platform's verification delivery carries the sentinel reply token
    // and is not signed with the channel secret.
    let is_verification = payload
        .events
        .iter()
        .all(|e| e.reply_token.as_deref() == Some(VERIFY_REPLY_TOKEN));
    if payload.events.is_empty() || is_verification {
        debug!("acknowledging verification or empty delivery");
        return (StatusCode::OK, "OK");
    }

    if let Some(secret) = &state.channel_secret {
        let signature = headers
            .get("x-line-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!("webhook signature verification failed");
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    for event in payload.events {
        match job_request_from_event(&event) {
            Some(request) => {
                info!(job_id = %request.job_id, "accepted inbound event");
                let orchestrator = state.orchestrator.clone();
                // The acknowledgment below must not wait on the pipeline.
                tokio::spawn(async move {
                    orchestrator.handle(request).await;
                });
            }
            None => {
                debug!(kind = %event.kind, "ignoring unsupported event");
            }
        }
    }

    (StatusCode::OK, "OK")
}

/// Verify the HMAC-SHA256 webhook signature (base64-encoded).
fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    if signature.is_empty() {
        return false;
    }
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    expected == signature
}

// --- Inbound event shapes (platform wire format, minimally parsed) ---

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "replyToken", default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
struct EventSource {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "contentProvider", default)]
    content_provider: Option<ContentProvider>,
}

#[derive(Debug, Deserialize)]
struct ContentProvider {
    #[serde(rename = "originalContentUrl", default)]
    original_content_url: Option<String>,
}

/// Map one platform event onto a pipeline job request.
///
/// Returns `None` for event kinds the pipeline does not handle (stickers,
/// follows, media without a resolvable content URL...), which are
/// acknowledged and dropped.
fn job_request_from_event(event: &WebhookEvent) -> Option<JobRequest> {
    if event.kind != "message" {
        return None;
    }
    let message = event.message.as_ref()?;
    let user_id = event.source.as_ref()?.user_id.clone()?;

    let input = match message.kind.as_str() {
        "text" => AnalysisInput::Text {
            query: message.text.clone().filter(|t| !t.is_empty())?,
        },
        "video" | "image" => {
            let content_type = if message.kind == "video" {
                ContentType::Video
            } else {
                ContentType::Image
            };
            let url = message
                .content_provider
                .as_ref()?
                .original_content_url
                .clone()?;
            AnalysisInput::Media { content_type, url }
        }
        _ => return None,
    };

    Some(JobRequest {
        job_id: JobId(message.id.clone()),
        user_id: user_id.clone(),
        platform_user_id: user_id,
        reply_token: event.reply_token.clone(),
        input,
    })
}
