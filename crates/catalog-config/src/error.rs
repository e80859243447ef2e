// crates/catalog-config/src/error.rs
// ============================================================================
// Module: Config Error
// Description: Errors raised while loading or validating configuration.
// Purpose: Distinguish "file not found"/"malformed TOML" from "validated and
// rejected", since the former is an operator mistake and the latter may
// legitimately be recoverable by disabling a feature (e.g. `use_ai`).
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised while loading or validating [`crate::AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A loaded configuration failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
