// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams of the pipeline.
//!
//! The orchestrator composes these rather than concrete clients, so tests
//! can substitute scripted mocks and the provider/platform can be swapped
//! without touching pipeline logic.

pub mod analysis;
pub mod delivery;
pub mod media;

pub use analysis::AnalysisProvider;
pub use delivery::DeliveryChannel;
pub use media::MediaStore;
