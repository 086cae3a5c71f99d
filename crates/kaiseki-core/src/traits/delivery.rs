// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery channel trait for chat platform integrations.

use async_trait::async_trait;

use crate::error::KaisekiError;

/// Adapter for outbound message delivery.
///
/// Platforms expose two primitives: a reply tied to one inbound event
/// (single-use, time-limited) and an identity-addressed push usable at any
/// time. The reply-then-push fallback policy lives in the pipeline, not
/// here.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Sends a reply bound to one inbound event.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), KaisekiError>;

    /// Sends an identity-addressed push message.
    async fn push(&self, user_id: &str, text: &str) -> Result<(), KaisekiError>;

    /// Whether the given id is a plausibly valid push target on this platform.
    fn is_valid_user_id(&self, user_id: &str) -> bool {
        !user_id.is_empty()
    }

    /// Whether the token is a known sentinel/placeholder (e.g. the platform's
    /// webhook verification token) that must never be replied to.
    fn is_placeholder_reply_token(&self, _token: &str) -> bool {
        false
    }
}
