// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply-then-push delivery policy.
//!
//! Reply-based delivery is preferred when a usable reply token exists
//! (lower latency, tied to the inbound event), with an identity-addressed
//! push as fallback. A failure here is an outcome to record on the job,
//! never a reason to re-run the analysis.

use kaiseki_core::{DeliveryChannel, KaisekiError};
use tracing::warn;

/// Run one delivery attempt sequence for a message.
///
/// Order: reply (if the token is present and not a placeholder), then push
/// (if the user id is valid). Returns `Err` only after every usable path
/// failed or none existed.
pub async fn deliver(
    channel: &dyn DeliveryChannel,
    reply_token: Option<&str>,
    user_id: &str,
    message: &str,
) -> Result<(), KaisekiError> {
    let usable_token = reply_token.filter(|t| !channel.is_placeholder_reply_token(t));

    if let Some(token) = usable_token {
        match channel.reply(token, message).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "reply delivery failed, falling back to push");
            }
        }
    }

    if channel.is_valid_user_id(user_id) {
        return channel.push(user_id, message).await;
    }

    Err(KaisekiError::Channel {
        message: format!("no usable delivery path for user `{user_id}`"),
        source: None,
    })
}
