// crates/catalog-providers/src/cache.rs
// ============================================================================
// Module: AI Result Cache
// Description: Fingerprint -> artifact cache with TTL and LRU-style eviction
// (spec §4.4).
// Purpose: Let the AI normalizer skip a network call for a name it has
// already seen, within the configured TTL, while keeping per-entry lookup
// and eviction cheap under concurrent readers.
// Dependencies: catalog-core, std::sync
// ============================================================================

//! ## Overview
//! A lookup holds one `RwLock` read guard for its whole duration and bumps
//! hit/miss counters with `AtomicU64` under that same guard, so no lock is
//! ever dropped and re-acquired mid-lookup and no race window opens between
//! the read and the counter bump (spec §9 Open Questions, DESIGN.md "Open
//! Question resolutions").

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use catalog_core::domain::CacheEntry;
use catalog_core::hashing::fingerprint;
use catalog_core::time::Timestamp;
use time::Duration;
use time::OffsetDateTime;

/// Snapshot of cache statistics (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Cumulative cache hits.
    pub hits: u64,
    /// Cumulative cache misses.
    pub misses: u64,
    /// Current number of live entries.
    pub entries: usize,
    /// `hits / (hits + misses)`, or 0.0 when no lookups have occurred.
    pub hit_rate: f64,
    /// Rough memory footprint estimate, in bytes.
    pub approx_memory_bytes: usize,
}

/// Per-entry byte estimate used for [`CacheStats::approx_memory_bytes`]; the
/// spec does not require an exact figure, only an order-of-magnitude gauge
/// for the metrics snapshot (spec §4.11).
const APPROX_BYTES_PER_ENTRY: usize = 256;

/// Fingerprint-keyed cache of AI normalization artifacts (spec §4.4).
///
/// # Invariants
/// - Single writer / many readers: all mutation goes through one `RwLock`
///   write guard at a time; reads take a read guard.
/// - Eviction at capacity removes the entry with the oldest `created_at`.
pub struct AiCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AiCache {
    /// Creates an empty cache with the given capacity and TTL.
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a source name, returning its cached artifact if present and
    /// unexpired. Counters are bumped under the same read guard used for
    /// the lookup (spec §9 Open Questions).
    #[must_use]
    pub fn get(&self, source_name: &str) -> Option<CacheEntry> {
        let key = fingerprint(source_name);
        let guard = self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        match guard.get(&key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores an artifact for `source_name`, evicting the oldest entry first
    /// if the cache is already at capacity.
    pub fn set(&self, source_name: &str, normalized_name: String, category: String, confidence: f64, reasoning: String) {
        let key = fingerprint(source_name);
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let expires_at = Timestamp::from_offset_date_time(now.as_offset_date_time() + self.ttl);
        let entry = CacheEntry { fingerprint: key.clone(), normalized_name, category, confidence, reasoning, created_at: now, expires_at };
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.len() >= self.max_entries && !guard.contains_key(&key) {
            evict_oldest(&mut guard);
        }
        guard.insert(key, entry);
    }

    /// Removes every entry, resetting the cache to empty (statistics are
    /// left intact; they describe lifetime activity, not current content).
    pub fn clear(&self) {
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clear();
    }

    /// Returns the current number of live entries, irrespective of
    /// expiry (expired entries are swept lazily on read, not eagerly).
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Returns a snapshot of cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let entries = self.size();
        CacheStats {
            hits,
            misses,
            entries,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            approx_memory_bytes: entries * APPROX_BYTES_PER_ENTRY,
        }
    }

    /// Sweeps every expired entry. Intended to run on a periodic background
    /// timer (spec §4.4 "background sweep every few minutes"); also callable
    /// directly from tests.
    pub fn sweep_expired(&self) {
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let mut guard = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.retain(|_, entry| !entry.is_expired(now));
    }
}

/// Removes the entry with the oldest `created_at` timestamp.
fn evict_oldest(entries: &mut HashMap<String, CacheEntry>) {
    let oldest_key = entries
        .iter()
        .min_by_key(|(_, entry)| entry.created_at.as_offset_date_time())
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest_key {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_set_and_get() {
        let cache = AiCache::new(10, Duration::seconds(60));
        cache.set("Молоток", "молоток".into(), "tools".into(), 0.9, "reason".into());
        let hit = cache.get("Молоток").expect("present");
        assert_eq!(hit.normalized_name, "молоток");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let cache = AiCache::new(10, Duration::seconds(60));
        cache.set("  Молоток ", "молоток".into(), "tools".into(), 0.9, "r".into());
        assert!(cache.get("молоток").is_some());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = AiCache::new(10, Duration::seconds(-1));
        cache.set("Молоток", "молоток".into(), "tools".into(), 0.9, "r".into());
        assert!(cache.get("Молоток").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn eviction_removes_oldest_entry_at_capacity() {
        let cache = AiCache::new(2, Duration::seconds(60));
        cache.set("a", "a".into(), "tools".into(), 0.9, "r".into());
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.set("b", "b".into(), "tools".into(), 0.9, "r".into());
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.set("c", "c".into(), "tools".into(), 0.9, "r".into());
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn sweep_expired_removes_only_expired_entries() {
        let cache = AiCache::new(10, Duration::seconds(-1));
        cache.set("a", "a".into(), "tools".into(), 0.9, "r".into());
        assert_eq!(cache.size(), 1);
        cache.sweep_expired();
        assert_eq!(cache.size(), 0);
    }
}
