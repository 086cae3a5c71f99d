// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job orchestration for the Kaiseki pipeline.
//!
//! Composes the admission guard, fingerprint cache, analysis provider,
//! response composer, delivery channel, and job ledger into the end-to-end
//! flow for one inbound request:
//!
//! inbound event -> guard -> (cached?) compose/deliver
//!                        -> analyze -> compose -> deliver -> ledger -> cache

pub mod cache;
pub mod delivery;
pub mod fingerprint;
pub mod orchestrator;

pub use cache::{CachePayload, FingerprintCache};
pub use delivery::deliver;
pub use fingerprint::cache_key;
pub use orchestrator::{JobOrchestrator, JobOutcome};
