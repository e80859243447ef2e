// crates/catalog-core/src/hashing.rs
// ============================================================================
// Module: Hashing
// Description: Fingerprinting and deterministic name-mapping helpers.
// Purpose: Give the cache and the dynamic-table machinery one shared,
// collision-resistant way to turn free text into a stable key.
// Dependencies: sha2
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

/// Computes the cache fingerprint for a source name: `SHA-256` of the name
/// after trimming and lowercasing, encoded as lowercase hex.
///
/// # Invariants
/// - Two names that differ only in surrounding whitespace or case fingerprint
///   identically (spec §4.4).
#[must_use]
pub fn fingerprint(source_name: &str) -> String {
    let normalized = source_name.trim().to_lowercase();
    hex_sha256(normalized.as_bytes())
}

/// Computes a deterministic, collision-free SQL table name for a catalog
/// name. SQLite identifiers tolerate almost any text when quoted, but we
/// still want a name stable across runs and safe to log; we take the first
/// 16 hex characters of the hash and prefix with `cat_` so the resulting
/// identifier is always a valid bare SQL identifier.
///
/// # Invariants
/// - Same `catalog_name` always yields the same table name (spec §8.10).
/// - Different `catalog_name`s yield different table names with
///   overwhelming probability (birthday bound on 64 bits of hash).
#[must_use]
pub fn catalog_table_name(catalog_name: &str) -> String {
    let normalized = catalog_name.trim().to_lowercase();
    let digest = hex_sha256(normalized.as_bytes());
    format!("cat_{}", &digest[..16])
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_case_and_whitespace_insensitive() {
        assert_eq!(fingerprint("  Молоток "), fingerprint("молоток"));
        assert_ne!(fingerprint("молоток"), fingerprint("молотки"));
    }

    #[test]
    fn catalog_table_name_is_deterministic_and_distinguishing() {
        let a = catalog_table_name("Номенклатура");
        let b = catalog_table_name("номенклатура");
        let c = catalog_table_name("Контрагенты");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("cat_"));
    }
}
