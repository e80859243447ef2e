// crates/catalog-config/src/app.rs
// ============================================================================
// Module: App Config
// Description: Top-level process configuration (spec §6 Environment).
// Purpose: One struct every binary loads at startup, combining store paths,
// pool sizing, and event-buffer sizing; secrets (`AI_API_KEY`) are read from
// the environment only, never from the TOML file, so they cannot land in a
// checked-in config.
// Dependencies: serde, toml, crate::error
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

/// Process-wide configuration (spec §6).
///
/// # Invariants
/// - `max_idle_conns <= max_open_conns`.
/// - All buffer sizes are `> 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP port the control plane listens on.
    pub port: u16,
    /// Path to the legacy combined database file, kept for deployments that
    /// have not split stores yet.
    pub database_path: PathBuf,
    /// Path to the normalized-data store file.
    pub normalized_database_path: PathBuf,
    /// Path to the service store file (tenancy, config, IC tree).
    pub service_database_path: PathBuf,
    /// Path to the unified catalogs store file.
    pub unified_catalogs_db_path: PathBuf,
    /// Capacity of the in-memory log ring buffer exposed over SSE.
    pub log_buffer_size: usize,
    /// Capacity of the normalizer progress-event channel.
    pub normalizer_events_buffer_size: usize,
    /// Maximum open SQLite connections per store.
    pub max_open_conns: u32,
    /// Maximum idle SQLite connections kept warm per store.
    pub max_idle_conns: u32,
    /// Maximum lifetime of a pooled connection before it is recycled.
    #[serde(with = "duration_seconds")]
    pub conn_max_lifetime: Duration,
    /// AI model identifier; overridden by `AI_MODEL` if set.
    pub ai_model: String,
    /// AI API key; always sourced from `AI_API_KEY`, never persisted here.
    #[serde(skip)]
    pub ai_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: PathBuf::from("data/catalog.db"),
            normalized_database_path: PathBuf::from("data/normalized.db"),
            service_database_path: PathBuf::from("data/service.db"),
            unified_catalogs_db_path: PathBuf::from("data/unified_catalogs.db"),
            log_buffer_size: 2_000,
            normalizer_events_buffer_size: 1_000,
            max_open_conns: 8,
            max_idle_conns: 4,
            conn_max_lifetime: Duration::from_secs(30 * 60),
            ai_model: "gpt-4o-mini".to_string(),
            ai_api_key: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file, then overlays environment
    /// variables (`CATALOG_PORT`, `AI_MODEL`, `AI_API_KEY`), then validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if `path` cannot be read,
    /// [`ConfigError::Parse`] if it is not valid TOML, and
    /// [`ConfigError::Invalid`] if the resulting configuration fails
    /// validation.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source: Box::new(source),
        })?;
        config.apply_env_overlay();
        config.validate()?;
        Ok(config)
    }

    /// Overlays recognized environment variables onto `self`.
    pub fn apply_env_overlay(&mut self) {
        self.apply_env_overlay_from(|key| std::env::var(key).ok());
    }

    /// Overlays recognized environment variables using `lookup` instead of
    /// the real process environment, so the overlay logic is testable
    /// without mutating global process state.
    pub fn apply_env_overlay_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("CATALOG_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(model) = lookup("AI_MODEL") {
            self.ai_model = model;
        }
        if let Some(key) = lookup("AI_API_KEY") {
            self.ai_api_key = Some(key);
        }
    }

    /// Validates structural invariants that do not depend on whether AI
    /// features are requested; the AI key presence is checked lazily by
    /// whichever job actually requests `use_ai`/`use_ic` (spec §4.10
    /// preconditions), not here, since a deployment with AI disabled should
    /// not fail to start merely for lacking a key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if pool sizing or buffer sizes are
    /// nonsensical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_idle_conns > self.max_open_conns {
            return Err(ConfigError::Invalid(format!(
                "max_idle_conns ({}) exceeds max_open_conns ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }
        if self.log_buffer_size == 0 {
            return Err(ConfigError::Invalid("log_buffer_size must be > 0".to_string()));
        }
        if self.normalizer_events_buffer_size == 0 {
            return Err(ConfigError::Invalid("normalizer_events_buffer_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// Returns whether an AI API key is configured.
    #[must_use]
    pub const fn has_ai_key(&self) -> bool {
        self.ai_api_key.is_some()
    }
}

mod duration_seconds {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn idle_exceeding_open_is_invalid() {
        let mut config = AppConfig { max_open_conns: 2, max_idle_conns: 4, ..AppConfig::default() };
        assert!(config.validate().is_err());
        config.max_idle_conns = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overlay_takes_precedence() {
        let mut config = AppConfig::default();
        config.apply_env_overlay_from(|key| (key == "AI_MODEL").then(|| "test-model".to_string()));
        assert_eq!(config.ai_model, "test-model");
    }
}
