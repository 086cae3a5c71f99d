// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per collection.

pub mod cache;
pub mod conversations;
pub mod guard;
pub mod jobs;
pub mod quota;
