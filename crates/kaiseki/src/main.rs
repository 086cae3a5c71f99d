// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kaiseki - media-analysis chat bot backend.
//!
//! This is the binary entry point: CLI parsing, config loading, tracing
//! setup, and dispatch to the webhook server or the media cleanup run.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod serve;

/// Kaiseki - media-analysis chat bot backend.
#[derive(Parser, Debug)]
#[command(name = "kaiseki", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server.
    Serve,
    /// Run media retention cleanup once and exit.
    Cleanup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match kaiseki_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            kaiseki_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Some(Commands::Serve) | None => serve::run(config).await,
        Some(Commands::Cleanup) => run_cleanup(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "kaiseki exited with error");
        std::process::exit(1);
    }
}

/// Delete media past the retention age, then oldest-first down to the
/// cleanup target.
async fn run_cleanup(config: kaiseki_config::KaisekiConfig) -> Result<(), kaiseki_core::KaisekiError> {
    let store = kaiseki_store::FsMediaStore::new(&config.media.root_dir);
    let report = kaiseki_store::cleanup(
        &store,
        chrono::Duration::days(i64::from(config.media.max_age_days)),
        config.media.cleanup_target_bytes,
    )
    .await?;

    println!(
        "cleanup: deleted {} objects ({} bytes), {} bytes remaining",
        report.deleted_count, report.deleted_bytes, report.remaining_bytes
    );
    Ok(())
}
