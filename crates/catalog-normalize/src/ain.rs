// crates/catalog-normalize/src/ain.rs
// ============================================================================
// Module: AI Normalizer (AIN)
// Description: Combines NN + CAT + the cache/batch/AI reliability substrate
// to produce `{normalized_name, category, confidence, reasoning}` (spec
// §4.7).
// Purpose: Decide when a name is worth an AI call at all, and enforce the
// response invariants the rest of the pipeline relies on.
// Dependencies: catalog-core, catalog-providers, serde_json, tracing
// ============================================================================

//! ## Overview
//! `requires_ai` (spec §4.7) is a pure decision function checked before any
//! network activity; [`AiNormalizer::normalize`] is the request path: cache
//! hit short-circuits everything, a miss either enqueues onto a shared
//! [`BatchProcessor`] or calls the AI client directly, and every response is
//! run through [`enforce_invariants`] before it reaches the caller.

use std::sync::Arc;

use catalog_core::providers::AiError;
use catalog_core::providers::AiProvider;
use catalog_core::providers::ChatRequest;
use catalog_providers::ai_client::parse_json_response;
use catalog_providers::batch::BatchProcessor;
use catalog_providers::cache::AiCache;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::categorizer;
use crate::name_normalizer;

/// Errors AIN can raise beyond what the underlying [`AiProvider`] raises
/// (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum AinError {
    /// The provider call failed or the circuit breaker refused it.
    #[error(transparent)]
    Provider(#[from] AiError),
}

/// Result of an AIN call (spec §4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct AinResult {
    /// AI-chosen normalized name.
    pub normalized_name: String,
    /// AI-chosen category.
    pub category: String,
    /// AI confidence in `[0, 1]`.
    pub confidence: f64,
    /// AI's free-text reasoning, if supplied.
    pub reasoning: String,
}

/// Raw shape of the AI's JSON response before invariant enforcement.
#[derive(Debug, Deserialize, Default)]
struct RawAinResponse {
    normalized_name: Option<String>,
    category: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Thresholds that decide whether a name is worth an AI call (spec §4.7
/// `requires_ai`).
const LONG_NAME_THRESHOLD: usize = 50;
const MANY_WORDS_THRESHOLD: usize = 5;
const DIGIT_RATIO_THRESHOLD: f64 = 0.30;
const SPECIAL_CHAR_RATIO_THRESHOLD: f64 = 0.10;

/// Recognized technical-spec tokens that, if present, mark a name as
/// AI-worthy regardless of length (spec §4.7 "recognized technical spec
/// tokens").
const TECHNICAL_TOKENS: &[&str] = &["mm", "cm", "kg", "kw", "watt", "мм", "см", "кг", "квт", "ip", "гост", "din"];

/// Returns whether `name`/`category` should be sent to AI for enrichment
/// (spec §4.7).
#[must_use]
pub fn requires_ai(name: &str, category: &str) -> bool {
    if category == categorizer::OTHER {
        return true;
    }
    if name.chars().count() > LONG_NAME_THRESHOLD {
        return true;
    }
    if name.split_whitespace().count() > MANY_WORDS_THRESHOLD {
        return true;
    }
    let total = name.chars().count().max(1);
    let digits = name.chars().filter(char::is_ascii_digit).count();
    if (digits as f64 / total as f64) >= DIGIT_RATIO_THRESHOLD {
        return true;
    }
    let special = name.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count();
    if (special as f64 / total as f64) >= SPECIAL_CHAR_RATIO_THRESHOLD {
        return true;
    }
    let lowered = name.to_lowercase();
    TECHNICAL_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Composes NN + CAT + the cache/batch/AI substrate (spec §4.7).
///
/// # Invariants
/// - A cache hit never invokes `ai_client` or the batch processor.
/// - Every returned [`AinResult`] satisfies [`enforce_invariants`].
pub struct AiNormalizer {
    cache: Arc<AiCache>,
    ai_client: Arc<dyn AiProvider>,
    batch: Option<Arc<BatchProcessor>>,
}

impl AiNormalizer {
    /// Builds an AI normalizer sharing the given cache and AI client. `batch`
    /// is `None` when batching is disabled; calls then go directly to
    /// `ai_client`.
    #[must_use]
    pub fn new(cache: Arc<AiCache>, ai_client: Arc<dyn AiProvider>, batch: Option<Arc<BatchProcessor>>) -> Self {
        Self { cache, ai_client, batch }
    }

    /// Runs the full AIN request path for one source name (spec §4.7).
    ///
    /// # Errors
    ///
    /// Returns [`AinError`] if the provider is unavailable or its response
    /// fails to parse as JSON; missing/invalid individual fields are
    /// defaulted rather than rejected (spec §4.7 invariants).
    pub async fn normalize(&self, source_name: &str) -> Result<AinResult, AinError> {
        if let Some(cached) = self.cache.get(source_name) {
            return Ok(AinResult {
                normalized_name: cached.normalized_name,
                category: cached.category,
                confidence: cached.confidence,
                reasoning: cached.reasoning,
            });
        }

        let prompt = build_prompt(source_name);
        let raw_text = self.dispatch(prompt).await?;
        let result = parse_response(&raw_text);

        self.cache.set(source_name, result.normalized_name.clone(), result.category.clone(), result.confidence, result.reasoning.clone());
        Ok(result)
    }

    /// Sends the request either through the shared batch processor or
    /// directly, depending on whether batching is enabled.
    async fn dispatch(&self, user_prompt: String) -> Result<String, AinError> {
        match &self.batch {
            Some(batch) => {
                let (handle, ready_batch) = batch.enqueue(user_prompt);
                if let Some(batch_items) = ready_batch {
                    self.dispatch_batch(batch_items).await;
                }
                Ok(handle.wait().await?)
            }
            None => {
                let request = ChatRequest { system_prompt: system_prompt(), user_prompt };
                Ok(self.ai_client.complete(request).await?)
            }
        }
    }

    /// Issues one AI call per queued prompt in a ready batch and
    /// demultiplexes the responses back to their handles by position (spec
    /// §4.6). The AI provider itself is a single-item chat-completion
    /// endpoint, so "one call per batch" here means the batch's prompts are
    /// concatenated into one request whose response is parsed as a JSON
    /// array aligned to submission order; any misalignment falls back to
    /// resolving every handle with the same parse error.
    async fn dispatch_batch(&self, items: Vec<(String, tokio::sync::oneshot::Sender<Result<String, AiError>>)>) {
        let prompts: Vec<&str> = items.iter().map(|(prompt, _)| prompt.as_str()).collect();
        let combined_prompt = build_batch_prompt(&prompts);
        let request = ChatRequest { system_prompt: batch_system_prompt(), user_prompt: combined_prompt };
        match self.ai_client.complete(request).await {
            Ok(text) => {
                let parts = split_batch_response(&text, items.len());
                for ((_, sender), part) in items.into_iter().zip(parts) {
                    let _ = sender.send(Ok(part));
                }
            }
            Err(err) => {
                for (_, sender) in items {
                    let _ = sender.send(Err(AiError::Transport(err.to_string())));
                }
            }
        }
    }
}

/// Parses a batch response, expecting a JSON array of per-item response
/// objects; falls back to repeating the whole response text for every
/// position if the array is malformed or short, letting
/// [`parse_response`]'s defaulting absorb the discrepancy rather than
/// failing the whole batch.
fn split_batch_response(text: &str, expected: usize) -> Vec<String> {
    match serde_json::from_str::<Vec<serde_json::Value>>(text) {
        Ok(values) if values.len() == expected => {
            values.into_iter().map(|value| value.to_string()).collect()
        }
        _ => {
            warn!(expected, "batch AI response did not parse as an aligned array; broadcasting raw text");
            std::iter::repeat(text.to_string()).take(expected).collect()
        }
    }
}

/// Parses and invariant-enforces a single AI response body (spec §4.7).
fn parse_response(raw_text: &str) -> AinResult {
    let value = match parse_json_response(raw_text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "AI response failed JSON parse; defaulting to empty result");
            serde_json::Value::Null
        }
    };
    let raw: RawAinResponse = serde_json::from_value(value).unwrap_or_default();
    enforce_invariants(raw)
}

/// Applies the response invariants AIN guarantees to every caller (spec
/// §4.7): `normalized_name` defaults to empty only as a last resort (callers
/// must treat an empty name as "AI had nothing useful to add"), `category`
/// defaults to `"other"`, `confidence` defaults to `0.5`.
fn enforce_invariants(raw: RawAinResponse) -> AinResult {
    AinResult {
        normalized_name: raw.normalized_name.unwrap_or_default(),
        category: raw.category.filter(|c| !c.is_empty()).unwrap_or_else(|| categorizer::OTHER.to_string()),
        confidence: raw.confidence.filter(|c| (0.0..=1.0).contains(c)).unwrap_or(0.5),
        reasoning: raw.reasoning.unwrap_or_default(),
    }
}

fn system_prompt() -> String {
    "You are a catalog normalization assistant. Given a raw product name and its rule-based \
     category guess, respond with a strict JSON object: \
     {\"normalized_name\": string, \"category\": string, \"confidence\": number in [0,1], \"reasoning\": string}."
        .to_string()
}

fn batch_system_prompt() -> String {
    "You are a catalog normalization assistant processing a batch of product names, one per line \
     prefixed with its index. Respond with a strict JSON array of objects in the same order, each \
     {\"normalized_name\": string, \"category\": string, \"confidence\": number in [0,1], \"reasoning\": string}."
        .to_string()
}

fn build_prompt(source_name: &str) -> String {
    let rule_based = name_normalizer::normalize(source_name);
    let rule_category = categorizer::categorize(source_name);
    format!(
        "Raw name: {source_name}\nRule-based normalized name: {}\nRule-based category: {rule_category}",
        rule_based.normalized_name
    )
}

fn build_batch_prompt(prompts: &[&str]) -> String {
    prompts.iter().enumerate().map(|(index, prompt)| format!("[{index}] {prompt}")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_providers::cache::AiCache;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use time::Duration;

    #[test]
    fn requires_ai_for_other_category() {
        assert!(requires_ai("Молоток", categorizer::OTHER));
    }

    #[test]
    fn requires_ai_for_long_names() {
        let long_name = "a".repeat(51);
        assert!(requires_ai(&long_name, "tools"));
    }

    #[test]
    fn requires_ai_for_many_words() {
        assert!(requires_ai("один два три четыре пять шесть", "tools"));
    }

    #[test]
    fn requires_ai_for_high_digit_ratio() {
        assert!(requires_ai("a1234", "tools"));
    }

    #[test]
    fn does_not_require_ai_for_short_plain_name() {
        assert!(!requires_ai("Молоток", "tools"));
    }

    #[test]
    fn enforce_invariants_defaults_missing_fields() {
        let result = enforce_invariants(RawAinResponse::default());
        assert_eq!(result.normalized_name, "");
        assert_eq!(result.category, categorizer::OTHER);
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn enforce_invariants_clamps_out_of_range_confidence() {
        let raw = RawAinResponse {
            normalized_name: Some("x".to_string()),
            category: Some("tools".to_string()),
            confidence: Some(1.5),
            reasoning: None,
        };
        assert!((enforce_invariants(raw).confidence - 0.5).abs() < f64::EPSILON);
    }

    struct StubProvider {
        calls: AtomicUsize,
        response: String,
    }

    #[async_trait]
    impl AiProvider for StubProvider {
        async fn complete(&self, _request: ChatRequest) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_call() {
        let cache = Arc::new(AiCache::new(10, Duration::seconds(60)));
        cache.set("Молоток", "молоток".into(), "tools".into(), 0.9, "cached".into());
        let provider = Arc::new(StubProvider { calls: AtomicUsize::new(0), response: String::new() });
        let ain = AiNormalizer::new(Arc::clone(&cache), provider.clone(), None);
        let result = ain.normalize("Молоток").await.expect("cached result");
        assert_eq!(result.normalized_name, "молоток");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn cache_miss_calls_provider_and_populates_cache() {
        let cache = Arc::new(AiCache::new(10, Duration::seconds(60)));
        let response = r#"{"normalized_name":"молоток","category":"tools","confidence":0.8,"reasoning":"ok"}"#;
        let provider = Arc::new(StubProvider { calls: AtomicUsize::new(0), response: response.to_string() });
        let ain = AiNormalizer::new(Arc::clone(&cache), provider.clone(), None);
        let result = ain.normalize("Неизвестный молоток XZ").await.expect("ok");
        assert_eq!(result.normalized_name, "молоток");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get("Неизвестный молоток XZ").is_some());
    }
}
