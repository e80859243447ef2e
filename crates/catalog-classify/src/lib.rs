// crates/catalog-classify/src/lib.rs
// ============================================================================
// Crate: catalog-classify
// Description: The Hierarchical Classifier (HC): AI-guided top-down descent
// of the IC tree with bounded worker concurrency (spec §4.10).
// Purpose: Assign `(ic_code, ic_name, confidence)` to every normalized group
// lacking one, walking the classifier tree level by level and persisting
// results as they complete.
// ============================================================================

//! ## Overview
//! - [`tree`] — indexed, read-only view over the IC forest (spec §3).
//! - [`descent`] — per-group AI-guided walk, with the rate-limit/circuit-
//!   breaker backoff policy spec §4.10 Orchestration specifies.
//! - [`orchestrator`] — the worker pool that runs `descent` over every
//!   pending group: bounded queue, pacing producer, stop flag,
//!   `current_tasks` map, progress events, and write-back retries.
//! - [`error`] — [`error::ClassifyError`], the precondition/store failures
//!   that stop a run before it starts.

pub mod descent;
pub mod error;
pub mod orchestrator;
pub mod tree;

pub use descent::DescentOutcome;
pub use descent::DescentStep;
pub use descent::descend;
pub use error::ClassifyError;
pub use orchestrator::ClassifierJob;
pub use orchestrator::ClassifierSummary;
pub use orchestrator::CurrentTask;
pub use tree::ClassifierTree;
