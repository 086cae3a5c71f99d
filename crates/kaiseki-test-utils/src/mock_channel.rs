// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery channel recording every send attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kaiseki_core::{DeliveryChannel, KaisekiError};

/// Which delivery primitive was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryVia {
    Reply,
    Push,
}

/// One recorded delivery attempt.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub via: DeliveryVia,
    pub target: String,
    pub text: String,
}

/// A mock delivery channel. Attempts are recorded whether they succeed or
/// not; failures are toggled per primitive.
pub struct MockChannel {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail_reply: AtomicBool,
    fail_push: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_reply: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
        }
    }

    /// Make every `reply` call fail (e.g. expired token).
    pub fn fail_replies(&self) {
        self.fail_reply.store(true, Ordering::SeqCst);
    }

    /// Make every `push` call fail.
    pub fn fail_pushes(&self) {
        self.fail_push.store(true, Ordering::SeqCst);
    }

    /// Snapshot of all recorded attempts, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Recorded attempts sent via the given primitive.
    pub fn sent_via(&self, via: DeliveryVia) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.via == via).collect()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryChannel for MockChannel {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), KaisekiError> {
        self.sent.lock().expect("sent lock").push(SentMessage {
            via: DeliveryVia::Reply,
            target: reply_token.to_string(),
            text: text.to_string(),
        });
        if self.fail_reply.load(Ordering::SeqCst) {
            return Err(KaisekiError::Channel {
                message: "reply error 400: Invalid reply token".into(),
                source: None,
            });
        }
        Ok(())
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), KaisekiError> {
        self.sent.lock().expect("sent lock").push(SentMessage {
            via: DeliveryVia::Push,
            target: user_id.to_string(),
            text: text.to_string(),
        });
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(KaisekiError::Channel {
                message: "push error 500: upstream unavailable".into(),
                source: None,
            });
        }
        Ok(())
    }

    fn is_placeholder_reply_token(&self, token: &str) -> bool {
        token.is_empty() || token.chars().all(|c| c == '0')
    }
}
