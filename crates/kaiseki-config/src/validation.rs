// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths, positive retry counts, and a
//! sane bind address.

use crate::diagnostic::ConfigError;
use crate::model::KaisekiConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &KaisekiConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.media.root_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "media.root_dir must not be empty".to_string(),
        });
    }

    if config.media.storage_limit_bytes == 0 {
        errors.push(ConfigError::Validation {
            message: "media.storage_limit_bytes must be positive".to_string(),
        });
    }

    if config.media.cleanup_target_bytes > config.media.storage_limit_bytes {
        errors.push(ConfigError::Validation {
            message: format!(
                "media.cleanup_target_bytes ({}) must not exceed media.storage_limit_bytes ({})",
                config.media.cleanup_target_bytes, config.media.storage_limit_bytes
            ),
        });
    }

    if config.analysis.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "analysis.max_attempts must be at least 1".to_string(),
        });
    }

    if config.analysis.endpoint.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "analysis.endpoint must not be empty".to_string(),
        });
    }

    if config.compose.max_ja_chars == 0 || config.compose.max_en_words == 0 {
        errors.push(ConfigError::Validation {
            message: "compose caps must be at least 1".to_string(),
        });
    }

    if config.pipeline.job_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "pipeline.job_timeout_secs must be positive".to_string(),
        });
    }

    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "server.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = KaisekiConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = KaisekiConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn zero_attempts_fails_validation() {
        let mut config = KaisekiConfig::default();
        config.analysis.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("max_attempts"))));
    }

    #[test]
    fn cleanup_target_above_limit_fails_validation() {
        let mut config = KaisekiConfig::default();
        config.media.storage_limit_bytes = 100;
        config.media.cleanup_target_bytes = 200;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("cleanup_target_bytes"))));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = KaisekiConfig::default();
        config.storage.database_path = "".to_string();
        config.analysis.max_attempts = 0;
        config.server.bind_address = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
    }
}
