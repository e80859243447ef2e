// crates/catalog-providers/src/ai_client.rs
// ============================================================================
// Module: AI Client
// Description: HTTP client for the external chat-completion endpoint,
// carrying a token-bucket rate limiter and the circuit breaker (spec §4.7).
// Purpose: Give `catalog-normalize::ain` and `catalog-classify` one
// `catalog_core::providers::AiProvider` implementation with retries and
// backoff already applied, so callers only deal with the trait seam.
// Dependencies: reqwest, governor, catalog-core
// ============================================================================

//! ## Overview
//! Request path (spec §4.7): the circuit breaker gates every call before the
//! rate limiter is even consulted, since a provider that's already
//! confirmed-down is not worth queuing against. On success the breaker
//! records success; on transport/non-2xx failure it records failure and the
//! call is retried up to `max_retries` times with exponential backoff before
//! surfacing [`catalog_core::providers::AiError::Transport`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use catalog_core::providers::AiError;
use catalog_core::providers::AiProvider;
use catalog_core::providers::ChatRequest;
use governor::Quota;
use governor::RateLimiter;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::clock::DefaultClock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::circuit_breaker::CircuitBreaker;

/// Configuration for [`HttpAiClient`].
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Base URL of the chat-completion endpoint.
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model identifier passed in the request body.
    pub model: String,
    /// Sustained request rate, in requests per second (spec §4.7 "~1 req/s
    /// sustained").
    pub requests_per_second: u32,
    /// Maximum burst size for the token bucket.
    pub burst_size: u32,
    /// Maximum retries on transport/non-2xx failure.
    pub max_retries: u32,
    /// Per-request timeout.
    pub request_timeout: StdDuration,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            requests_per_second: 1,
            burst_size: 3,
            max_retries: 3,
            request_timeout: StdDuration::from_secs(30),
        }
    }
}

type TokenBucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Chat-completion HTTP client with a shared rate limiter and circuit
/// breaker (spec §4.7).
///
/// # Invariants
/// - One rate limiter instance is shared across every call made through this
///   client, honoring the "shared across all callers of the same instance"
///   contract (spec §4.7).
pub struct HttpAiClient {
    http: reqwest::Client,
    config: AiClientConfig,
    limiter: TokenBucket,
    breaker: Arc<CircuitBreaker>,
}

impl HttpAiClient {
    /// Builds a new client sharing `breaker` with any other collaborator
    /// that needs to observe the same circuit state (e.g. the control
    /// plane's metrics snapshot, spec §4.11).
    ///
    /// # Panics
    ///
    /// Panics if `requests_per_second` or `burst_size` is zero; both are
    /// validated by [`catalog_config::NormalizationConfig`] before reaching
    /// here.
    #[must_use]
    pub fn new(config: AiClientConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let per_second = std::num::NonZeroU32::new(config.requests_per_second.max(1)).unwrap_or_else(|| {
            std::num::NonZeroU32::new(1).unwrap_or(std::num::NonZeroU32::MIN)
        });
        let burst = std::num::NonZeroU32::new(config.burst_size.max(1)).unwrap_or_else(|| {
            std::num::NonZeroU32::new(1).unwrap_or(std::num::NonZeroU32::MIN)
        });
        let quota = Quota::per_second(per_second).allow_burst(burst);
        let http = reqwest::Client::builder().timeout(config.request_timeout).build().unwrap_or_default();
        Self { http, config, limiter: RateLimiter::direct(quota), breaker }
    }

    /// Returns the shared circuit breaker, for callers that want to surface
    /// its snapshot alongside the AI client's own state (spec §4.11
    /// metrics).
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String, AiError> {
        let body = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: request.system_prompt.clone() },
                ChatMessage { role: "user".to_string(), content: request.user_prompt.clone() },
            ],
            response_format: ResponseFormat { kind: "json_object".to_string() },
        };
        let response = self
            .http
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AiError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(AiError::Transport(format!("AI provider returned status {}", response.status())));
        }
        let parsed: CompletionResponse =
            response.json().await.map_err(|err| AiError::Transport(format!("malformed AI response envelope: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::InvalidResponse("AI response had no choices".to_string()))?;
        Ok(content)
    }
}

#[async_trait]
impl AiProvider for HttpAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, AiError> {
        if !self.breaker.can_proceed() {
            return Err(AiError::Unavailable("circuit breaker open".to_string()));
        }
        self.limiter.until_ready().await;
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match self.send_once(&request).await {
                Ok(text) => {
                    self.breaker.record_success();
                    return Ok(text);
                }
                Err(err) => {
                    last_error = Some(err);
                    if attempt < self.config.max_retries {
                        let backoff = StdDuration::from_millis(50 * 2u64.pow(attempt));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        self.breaker.record_failure();
        Err(last_error.unwrap_or_else(|| AiError::Transport("AI call failed with no error detail".to_string())))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Parses a strict-JSON AI response body into a generic [`Value`], used by
/// callers (AIN, HC) that then pull out their own expected fields. Kept here
/// rather than in each caller since "expect a strict JSON object" is a
/// client-level contract (spec §4.7), not caller-specific parsing.
///
/// # Errors
///
/// Returns [`AiError::InvalidResponse`] if `text` is not valid JSON.
pub fn parse_json_response(text: &str) -> Result<Value, AiError> {
    serde_json::from_str(text).map_err(|err| AiError::InvalidResponse(format!("AI response was not valid JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_response_rejects_non_json() {
        assert!(parse_json_response("not json").is_err());
    }

    #[test]
    fn parse_json_response_accepts_object() {
        let value = parse_json_response(r#"{"normalized_name": "молоток"}"#).expect("valid json");
        assert_eq!(value["normalized_name"], "молоток");
    }
}
