// crates/catalog-providers/src/lib.rs
// ============================================================================
// Crate: catalog-providers
// Description: The reliability substrate shared by the normalizer and the
// hierarchical classifier (spec §2 "C, CB, BP, AI").
// Purpose: Give `catalog-normalize` and `catalog-classify` one fingerprint
// cache, one circuit breaker, one batch processor, and one AI HTTP client,
// each an explicit collaborator rather than an ambient global (Design Notes
// §9 "Global mutable state").
// ============================================================================

//! ## Overview
//! - [`cache`] — fingerprint→artifact cache with TTL and LRU-style eviction
//!   (spec §4.4).
//! - [`circuit_breaker`] — three-state failure gate in front of the AI
//!   client (spec §4.5).
//! - [`batch`] — coalesces single-item AI calls into bounded batches (spec
//!   §4.6).
//! - [`ai_client`] — the chat-completion HTTP client with a token-bucket
//!   rate limiter (spec §4.7).
//! - [`registry`] — constructs the AI client from `catalog_config::AppConfig`.

pub mod ai_client;
pub mod batch;
pub mod cache;
pub mod circuit_breaker;
pub mod registry;

pub use ai_client::HttpAiClient;
pub use batch::BatchProcessor;
pub use cache::AiCache;
pub use circuit_breaker::CircuitBreaker;
pub use circuit_breaker::CircuitState;
pub use registry::ProviderBundle;
