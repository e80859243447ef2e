// crates/catalog-config/src/normalization.rs
// ============================================================================
// Module: Normalization Config
// Description: Tunables for NRM/AIN/DA/HC (spec §4.8, §4.9, §4.10, §6).
// Purpose: Keep every threshold the pipeline reads out of hardcoded
// constants and in one validated, serializable struct.
// Dependencies: serde, crate::error
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

/// Tunables for a normalization run (spec §6 "Start normalization").
///
/// # Invariants
/// - `min_confidence` is in `[0, 1]`.
/// - `batch_size > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Whether AIN should be consulted at all.
    pub use_ai: bool,
    /// Minimum AI confidence required to replace rule-based output (spec
    /// §4.8 step 3).
    pub min_confidence: f64,
    /// Delay, in milliseconds, the AI client's rate limiter targets.
    pub rate_limit_delay_ms: u64,
    /// Maximum AI call retries before giving up on a single item.
    pub max_retries: u32,
    /// Whether IC classification should run after normalization.
    pub use_ic: bool,
    /// Maximum batch size for the batch processor (spec §4.6).
    pub batch_size: usize,
    /// Batch flush interval in milliseconds (spec §4.6).
    pub flush_interval_ms: u64,
    /// Cache TTL in seconds (spec §4.4).
    pub cache_ttl_seconds: u64,
    /// Maximum cache entries before LRU-style eviction (spec §4.4).
    pub cache_max_entries: usize,
    /// Consecutive AI failures before the circuit breaker opens (spec
    /// §4.5).
    pub circuit_breaker_failure_threshold: u32,
    /// Circuit breaker cool-down before a half-open probe (spec §4.5).
    pub circuit_breaker_cooldown_ms: u64,
    /// Number of rows between progress events (spec §4.8 step 7).
    pub progress_event_interval: u64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            use_ai: true,
            min_confidence: 0.6,
            rate_limit_delay_ms: 1_000,
            max_retries: 3,
            use_ic: true,
            batch_size: 10,
            flush_interval_ms: 500,
            cache_ttl_seconds: 24 * 60 * 60,
            cache_max_entries: 50_000,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_cooldown_ms: 30_000,
            progress_event_interval: 1_000,
        }
    }
}

impl NormalizationConfig {
    /// Validates the tunables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `min_confidence` is out of range
    /// or any size/count field is zero where it must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if self.progress_event_interval == 0 {
            return Err(ConfigError::Invalid("progress_event_interval must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Thresholds for the Duplicate Analyzer (spec §4.9).
///
/// # Invariants
/// - All thresholds are in `[0, 1]` except `min_common_words`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateAnalysisConfig {
    /// Minimum TF-IDF cosine similarity for a semantic match.
    pub semantic_threshold: f64,
    /// Minimum phonetic-hash similarity for a phonetic match.
    pub phonetic_threshold: f64,
    /// Minimum shared tokens for a word-based match.
    pub min_common_words: u32,
    /// Whether stop words are removed before word-based matching.
    pub remove_stop_words: bool,
}

impl Default for DuplicateAnalysisConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.85,
            phonetic_threshold: 0.90,
            min_common_words: 2,
            remove_stop_words: true,
        }
    }
}

/// Worker/concurrency tunables for the Hierarchical Classifier (spec §4.10).
///
/// # Invariants
/// - `provider_concurrent_call_limit >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Configured worker pool size before provider/NRM caps are applied.
    pub worker_count: usize,
    /// Hard cap on concurrent AI calls the provider tolerates.
    pub provider_concurrent_call_limit: usize,
    /// Number of completed groups between progress events (spec §4.10).
    pub progress_event_interval: u64,
    /// Dispatch pacing: sleep after every `dispatch_pace_every` tasks.
    pub dispatch_pace_every: u32,
    /// Dispatch pacing sleep duration in milliseconds.
    pub dispatch_pace_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            provider_concurrent_call_limit: 2,
            progress_event_interval: 20,
            dispatch_pace_every: 10,
            dispatch_pace_ms: 200,
        }
    }
}

impl ClassifierConfig {
    /// Returns the effective worker count: the configured count, capped by
    /// the provider's concurrent-call limit, reduced by one more when NRM is
    /// concurrently active (spec §4.10, §5).
    #[must_use]
    pub fn effective_workers(&self, normalizer_running: bool) -> usize {
        let capped = self.worker_count.min(self.provider_concurrent_call_limit);
        if normalizer_running { capped.saturating_sub(1).max(1) } else { capped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_normalization_config_validates() {
        assert!(NormalizationConfig::default().validate().is_ok());
    }

    #[test]
    fn min_confidence_out_of_range_is_invalid() {
        let config = NormalizationConfig { min_confidence: 1.5, ..NormalizationConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_workers_reserves_one_for_normalizer() {
        let config = ClassifierConfig { worker_count: 4, provider_concurrent_call_limit: 2, ..ClassifierConfig::default() };
        assert_eq!(config.effective_workers(false), 2);
        assert_eq!(config.effective_workers(true), 1);
    }

    #[test]
    fn effective_workers_never_reaches_zero() {
        let config = ClassifierConfig { worker_count: 1, provider_concurrent_call_limit: 1, ..ClassifierConfig::default() };
        assert_eq!(config.effective_workers(true), 1);
    }
}
