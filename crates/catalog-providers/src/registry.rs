// crates/catalog-providers/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Builds the AI client, cache, circuit breaker and batch
// processor from validated configuration (spec §4.7, §6).
// Purpose: One construction point so `catalog-normalize`/`catalog-classify`
// and the binaries in `catalog-service`/`catalog-cli` do not each wire up
// their own copy of the reliability substrate.
// Dependencies: catalog-config, catalog-core
// ============================================================================

//! ## Overview
//! A small struct that owns the shared collaborators and access to them,
//! rather than each caller constructing its own
//! `HttpAiClient`/`AiCache`/`CircuitBreaker`. Unlike a lookup-by-name
//! registry over several interchangeable provider kinds, this bundle is
//! fixed: the pipeline has exactly one AI provider slot, and every job that
//! needs it shares the same instance so the cache, breaker, and rate
//! limiter state stays coherent across NRM and HC.

use std::sync::Arc;

use catalog_config::AppConfig;
use catalog_config::NormalizationConfig;
use time::Duration;

use crate::ai_client::AiClientConfig;
use crate::ai_client::HttpAiClient;
use crate::cache::AiCache;
use crate::circuit_breaker::CircuitBreaker;

/// The reliability substrate shared by every job that talks to the AI
/// provider (spec §2, §4.4-§4.7).
///
/// # Invariants
/// - `ai_client` and `cache` are the same instances across every
///   caller that holds a clone of this bundle; cloning `ProviderBundle`
///   clones `Arc`s, not the underlying state.
#[derive(Clone)]
pub struct ProviderBundle {
    /// The AI chat-completion client, already wired to the shared breaker.
    pub ai_client: Arc<HttpAiClient>,
    /// The fingerprint→artifact cache (spec §4.4).
    pub cache: Arc<AiCache>,
    /// The circuit breaker guarding `ai_client` (spec §4.5).
    pub breaker: Arc<CircuitBreaker>,
}

impl ProviderBundle {
    /// Builds a provider bundle from app and normalization configuration.
    ///
    /// Returns `None` if `app.ai_api_key` is unset; callers that require AI
    /// (spec §4.10 preconditions) should treat that as "AI unavailable" and
    /// run rule-based only, not as a hard error (spec §7).
    #[must_use]
    pub fn build(app: &AppConfig, normalization: &NormalizationConfig) -> Option<Self> {
        let api_key = app.ai_api_key.clone()?;
        let breaker = Arc::new(CircuitBreaker::new(
            normalization.circuit_breaker_failure_threshold,
            Duration::milliseconds(i64::try_from(normalization.circuit_breaker_cooldown_ms).unwrap_or(i64::MAX)),
        ));
        let requests_per_second = if normalization.rate_limit_delay_ms == 0 {
            1
        } else {
            u32::try_from((1_000 / normalization.rate_limit_delay_ms.max(1)).max(1)).unwrap_or(u32::MAX)
        };
        let client_config = AiClientConfig {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key,
            model: app.ai_model.clone(),
            requests_per_second,
            burst_size: 3,
            max_retries: normalization.max_retries,
            request_timeout: std::time::Duration::from_secs(30),
        };
        let ai_client = Arc::new(HttpAiClient::new(client_config, Arc::clone(&breaker)));
        let cache = Arc::new(AiCache::new(
            normalization.cache_max_entries,
            Duration::seconds(i64::try_from(normalization.cache_ttl_seconds).unwrap_or(i64::MAX)),
        ));
        Some(Self { ai_client, cache, breaker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_returns_none_without_api_key() {
        let app = AppConfig { ai_api_key: None, ..AppConfig::default() };
        assert!(ProviderBundle::build(&app, &NormalizationConfig::default()).is_none());
    }

    #[test]
    fn build_succeeds_with_api_key() {
        let app = AppConfig { ai_api_key: Some("sk-test".to_string()), ..AppConfig::default() };
        let bundle = ProviderBundle::build(&app, &NormalizationConfig::default());
        assert!(bundle.is_some());
    }
}
