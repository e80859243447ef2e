// crates/catalog-core/src/identifiers.rs
// ============================================================================
// Module: Catalog Identifiers
// Description: Canonical opaque identifiers used across the pipeline.
// Purpose: Provide strongly typed, serializable identifiers with stable wire
// forms so callers never confuse one numeric id for another.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Numeric identifiers wrap `i64` (the native SQLite `INTEGER PRIMARY KEY`
//! type) rather than `NonZeroU64`: row ids start at 1 under normal operation
//! but `0`/negative values are only ever a caller bug, not a wire-format
//! concern, so we do not pay for a non-zero invariant here. The upload
//! identifier is a `Uuid` because it is minted by the ingestion handshake and
//! must be unguessable and globally unique across concurrent producers.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Macro for a newtype wrapping an `i64` row identifier.
macro_rules! row_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(UploadRowId, "Row identifier of an upload in the unified store.");
row_id!(CatalogRowId, "Row identifier of a catalog item in its dynamic table.");
row_id!(ConstantId, "Row identifier of a constant.");
row_id!(NomenclatureRowId, "Row identifier of a nomenclature item.");
row_id!(NormalizedDataId, "Row identifier of a normalized data row.");
row_id!(ItemAttributeId, "Row identifier of an extracted item attribute.");
row_id!(SnapshotId, "Row identifier of a named snapshot.");
row_id!(ClientId, "Row identifier of a tenant client.");
row_id!(ProjectId, "Row identifier of a client project.");
row_id!(ProjectDatabaseId, "Row identifier of a project database entry.");

/// Upload identifier minted by the ingestion handshake.
///
/// # Invariants
/// - Generated once per upload session and never reused.
/// - Serializes as its canonical hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadUuid(Uuid);

impl UploadUuid {
    /// Generates a new random upload identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an upload identifier from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Returns the underlying [`Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UploadUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Classifier (IC) code: a dotted hierarchical string such as `"28.29.11"`.
///
/// # Invariants
/// - Opaque; no normalization or validation is applied by this type, only by
///   the classifier tree loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IcCode(String);

impl IcCode {
    /// Creates a new IC code from an owned string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IcCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_uuid_round_trips_through_string() {
        let uuid = UploadUuid::new_v4();
        let parsed = UploadUuid::parse(&uuid.to_string()).expect("valid uuid string");
        assert_eq!(uuid, parsed);
    }

    #[test]
    fn row_id_displays_as_raw_integer() {
        let id = NormalizedDataId(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.get(), 42);
    }
}
