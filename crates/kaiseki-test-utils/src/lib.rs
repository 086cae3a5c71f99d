// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Kaiseki integration tests.
//!
//! Scripted implementations of the core adapter traits, so orchestrator
//! tests run without any network or external service.

pub mod mock_channel;
pub mod mock_provider;

pub use mock_channel::{DeliveryVia, MockChannel, SentMessage};
pub use mock_provider::{MockProvider, ScriptedOutcome};
