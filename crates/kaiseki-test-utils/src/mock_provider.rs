// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock analysis provider for deterministic testing.
//!
//! `MockProvider` implements `AnalysisProvider` with pre-scripted outcomes,
//! enabling fast, CI-runnable orchestrator tests without external API
//! calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kaiseki_core::{
    AnalysisOutcome, AnalysisProvider, AnalysisRequest, KaisekiError, ProviderAnswer,
};
use tokio::sync::Mutex;

/// A scripted outcome: an answer, an overloaded signal, or a fatal error.
pub enum ScriptedOutcome {
    Answer(ProviderAnswer),
    Overloaded,
    Fatal(String),
}

/// A mock analysis provider that pops pre-scripted outcomes from a FIFO
/// queue. When the queue is empty, a default answer is returned.
pub struct MockProvider {
    outcomes: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a plain answer with the given raw text.
    pub async fn push_answer(&self, text: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(ScriptedOutcome::Answer(ProviderAnswer {
                text: text.into(),
                conversation_id: Some("mock-conv".into()),
                meta: serde_json::json!({}),
            }));
    }

    /// Queue a fully specified answer.
    pub async fn push_provider_answer(&self, answer: ProviderAnswer) {
        self.outcomes
            .lock()
            .await
            .push_back(ScriptedOutcome::Answer(answer));
    }

    /// Queue an overloaded outcome (retries exhausted).
    pub async fn push_overloaded(&self) {
        self.outcomes
            .lock()
            .await
            .push_back(ScriptedOutcome::Overloaded);
    }

    /// Queue a fatal provider error.
    pub async fn push_fatal(&self, message: impl Into<String>) {
        self.outcomes
            .lock()
            .await
            .push_back(ScriptedOutcome::Fatal(message.into()));
    }

    /// Number of `analyze` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisProvider for MockProvider {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisOutcome, KaisekiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().await.pop_front() {
            Some(ScriptedOutcome::Answer(answer)) => Ok(AnalysisOutcome::Answer(answer)),
            Some(ScriptedOutcome::Overloaded) => Ok(AnalysisOutcome::Overloaded),
            Some(ScriptedOutcome::Fatal(message)) => Err(KaisekiError::Provider {
                message,
                source: None,
            }),
            None => Ok(AnalysisOutcome::Answer(ProviderAnswer {
                text: "mock answer".into(),
                conversation_id: None,
                meta: serde_json::json!({}),
            })),
        }
    }
}
