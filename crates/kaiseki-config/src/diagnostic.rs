// SPDX-FileCopyrightText: 2026 Kaiseki Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge.
//!
//! Converts Figment deserialization errors and validation failures into
//! miette diagnostics so startup failures are readable rather than a
//! single collapsed Debug line.

use miette::Diagnostic;
use thiserror::Error;

/// A configuration error with diagnostic metadata.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(kaiseki::config::unknown_key),
        help("check the key against the [{section}] section of kaiseki.toml")
    )]
    UnknownKey {
        /// The unrecognized key name.
        key: String,
        /// The section the key appeared in.
        section: String,
    },

    /// A configuration value failed deserialization.
    #[error("invalid configuration value: {detail}")]
    #[diagnostic(code(kaiseki::config::invalid_value))]
    InvalidValue {
        /// Description of the failure, including the offending key path.
        detail: String,
    },

    /// A semantic validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(kaiseki::config::validation))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(kaiseki::config::other))]
    Other(String),
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// A figment error may contain multiple underlying errors (one per failing
/// key); each becomes its own diagnostic.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|e| {
            let path = e.path.join(".");
            match &e.kind {
                Kind::UnknownField(field, _) => ConfigError::UnknownKey {
                    key: field.clone(),
                    section: if path.is_empty() {
                        "root".to_string()
                    } else {
                        path.clone()
                    },
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidValue {
                    detail: format!("`{path}`: expected {expected}, found {actual}"),
                },
                Kind::MissingField(field) => ConfigError::InvalidValue {
                    detail: format!("`{path}`: missing required field `{field}`"),
                },
                _ => ConfigError::Other(e.to_string()),
            }
        })
        .collect()
}

/// Render config errors to stderr as miette reports.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        let report = miette::Report::msg(error.to_string());
        eprintln!("kaiseki: {report:?}");
    }
}
