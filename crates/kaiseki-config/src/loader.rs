// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./kaiseki.toml` > `~/.config/kaiseki/kaiseki.toml`
//! > `/etc/kaiseki/kaiseki.toml` with environment variable overrides via the
//! `KAISEKI_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KaisekiConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kaiseki/kaiseki.toml` (system-wide)
/// 3. `~/.config/kaiseki/kaiseki.toml` (user XDG config)
/// 4. `./kaiseki.toml` (local directory)
/// 5. `KAISEKI_*` environment variables
pub fn load_config() -> Result<KaisekiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KaisekiConfig::default()))
        .merge(Toml::file("/etc/kaiseki/kaiseki.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("kaiseki/kaiseki.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("kaiseki.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<KaisekiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KaisekiConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KaisekiConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KaisekiConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `KAISEKI_LINE_CHANNEL_ACCESS_TOKEN` must
/// map to `line.channel_access_token`, not `line.channel.access.token`.
fn env_provider() -> Env {
    Env::prefixed("KAISEKI_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("line_", "line.", 1)
            .replacen("analysis_", "analysis.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("media_", "media.", 1)
            .replacen("quota_", "quota.", 1)
            .replacen("compose_", "compose.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("pipeline_", "pipeline.", 1)
            .replacen("server_", "server.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.service.name, "kaiseki");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[analysis]
max_attempts = 5
base_delay_ms = 250

[media]
storage_limit_bytes = 1024
"#,
        )
        .unwrap();
        assert_eq!(config.analysis.max_attempts, 5);
        assert_eq!(config.analysis.base_delay_ms, 250);
        assert_eq!(config.media.storage_limit_bytes, 1024);
        // Untouched keys keep defaults.
        assert_eq!(config.analysis.request_timeout_secs, 15);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let result = load_config_from_str(
            r#"
[analysis]
max_retries = 5
"#,
        );
        assert!(result.is_err());
    }
}
