// crates/catalog-core/src/providers.rs
// ============================================================================
// Module: AI Provider Interface
// Description: The trait seam `catalog-normalize` and `catalog-classify`
// program against instead of depending on `catalog-providers` directly.
// Purpose: Keep the AI client swappable (real HTTP client in production, a
// fixture in tests) per Design Notes §9 "Global mutable state" — the cache,
// circuit breaker, and AI client are explicit collaborators, not ambient
// globals.
// Dependencies: async-trait, thiserror
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

/// A chat-completion request: one system prompt and one user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// System prompt establishing the task.
    pub system_prompt: String,
    /// User prompt carrying the actual input.
    pub user_prompt: String,
}

/// Errors the AI provider seam can raise (spec §4.7, §7).
#[derive(Debug, Error)]
pub enum AiError {
    /// The circuit breaker is open; the call was not attempted.
    #[error("AI provider unavailable: {0}")]
    Unavailable(String),

    /// The provider responded but the payload failed schema/invariant
    /// validation.
    #[error("AI response invalid: {0}")]
    InvalidResponse(String),

    /// Transport-level failure (network, timeout, non-2xx status).
    #[error("AI transport error: {0}")]
    Transport(String),
}

/// A chat-completion provider.
///
/// # Invariants
/// - Implementations must honor their own rate limiter/circuit breaker
///   internally; callers do not retry on `Unavailable`.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Issues one chat-completion call and returns the raw response text,
    /// which callers parse as strict JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] per the variants above.
    async fn complete(&self, request: ChatRequest) -> Result<String, AiError>;
}
