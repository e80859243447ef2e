// crates/catalog-core/src/error.rs
// ============================================================================
// Module: Core Error Taxonomy
// Description: The shared error kinds surfaced across the pipeline (spec §7).
// Purpose: Give every crate one error type to convert into at its public
// boundary so the control plane can map failures to HTTP status codes and
// XML error envelopes uniformly.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `CoreError` is deliberately flat: it does not attempt to preserve the
//! causal chain through every layer (each crate's own error type does that
//! with `#[source]`), it only classifies the failure into the six kinds the
//! control plane needs to distinguish. Long-running jobs never propagate a
//! `CoreError` for a single row/group failure; per spec §7 that is counted
//! and sampled, not raised.

use thiserror::Error;

/// The error kinds surfaced by the core (spec §7).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing required protocol field, malformed payload, unknown upload
    /// UUID, or any other caller-supplied input that fails validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Upload, catalog, database, or snapshot not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// A job of this kind is already running.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The AI provider is unavailable: circuit breaker open, rate limit
    /// exhausted after retries, or no provider configured.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The store is locked or a statement timed out; retried internally up
    /// to a cap and only surfaced after exhaustion.
    #[error("busy, retries exhausted: {0}")]
    Busy(String),

    /// Unexpected store or parse failure with no more specific kind.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns a short machine-readable kind tag, used in HTTP/XML error
    /// envelopes and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unavailable(_) => "unavailable",
            Self::Busy(_) => "busy",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns whether this error kind is retryable by the caller without
    /// changing the request (only `Busy` is; `Unavailable` requires waiting
    /// for a circuit breaker or rate limiter to reopen, which callers of
    /// this type do internally rather than the HTTP client).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(CoreError::Validation("x".into()).kind(), "validation");
        assert_eq!(CoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(CoreError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(CoreError::Unavailable("x".into()).kind(), "unavailable");
        assert_eq!(CoreError::Busy("x".into()).kind(), "busy");
        assert_eq!(CoreError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn only_busy_is_retryable() {
        assert!(CoreError::Busy("x".into()).is_retryable());
        assert!(!CoreError::Internal("x".into()).is_retryable());
    }
}
