// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis provider client for the Kaiseki pipeline.
//!
//! Implements [`kaiseki_core::AnalysisProvider`] over the provider's HTTP
//! chat-messages endpoint with one consolidated retry/backoff policy and
//! overload classification.

pub mod client;
pub mod retry;
pub mod types;

pub use client::AnalysisClient;
pub use retry::{overload_classifier, AttemptFailure, RetryPolicy};
