// crates/catalog-classify/src/error.rs
// ============================================================================
// Module: Classifier Errors
// Description: Error kinds raised by the Hierarchical Classifier (spec §4.10,
// §7).
// Purpose: Distinguish "do not start the job" precondition failures from
// per-group descent/write-back failures, which are counted rather than
// propagated (spec §7).
// Dependencies: thiserror, catalog-core
// ============================================================================

use thiserror::Error;

/// Errors the classifier job can raise (spec §4.10).
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A precondition failed before any worker started (spec §4.10
    /// preconditions): the IC tree is empty, or no AI provider is
    /// configured. Carries a human-readable remediation hint.
    #[error("classifier preconditions not met: {0}")]
    Precondition(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] catalog_core::CoreError),
}
