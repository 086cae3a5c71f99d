// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence and media store for the Kaiseki pipeline.
//!
//! Hosts the five durable collections the pipeline coordinates through
//! (jobs, daily_usage, guard_flag, storage_usage, response_cache) plus the
//! conversation continuity map, and the filesystem media store used for
//! capacity metering and retention cleanup.
//!
//! All SQLite access goes through one tokio-rusqlite background thread; the
//! quota reservation is the only multi-statement transaction.

pub mod database;
pub mod media;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use media::{cleanup, CleanupReport, FsMediaStore};
