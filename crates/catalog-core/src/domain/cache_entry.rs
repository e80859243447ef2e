// crates/catalog-core/src/domain/cache_entry.rs
// ============================================================================
// Module: Cache Entry
// Description: The artifact shape cached by the reliability substrate's
// Cache (C) component (spec §3, §4.4).
// Purpose: Give `catalog-providers::cache` a concrete value type without
// that crate depending back on the AI-normalizer crate.
// Dependencies: serde, crate::time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::time::Timestamp;

/// A cached AI-normalization artifact keyed by [`crate::hashing::fingerprint`].
///
/// # Invariants
/// - Removed by TTL sweep, explicit clear, or LRU-style eviction — never
///   mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint key this entry was stored under.
    pub fingerprint: String,
    /// Normalized name produced by AIN.
    pub normalized_name: String,
    /// Assigned category.
    pub category: String,
    /// AI confidence.
    pub confidence: f64,
    /// AI reasoning text.
    pub reasoning: String,
    /// Time the entry was created.
    pub created_at: Timestamp,
    /// Time the entry expires.
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Returns whether this entry has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.as_offset_date_time() >= self.expires_at.as_offset_date_time()
    }
}
