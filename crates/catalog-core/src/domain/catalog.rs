// crates/catalog-core/src/domain/catalog.rs
// ============================================================================
// Module: Catalog Payloads
// Description: Constants, dynamic-catalog rows, and nomenclature items
// ingested per upload (spec §3).
// Purpose: Model the opaque-payload entities the ERP producer sends, keeping
// their XML/text payloads verbatim rather than parsing into a fixed schema.
// Dependencies: serde, crate::identifiers, crate::time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CatalogRowId;
use crate::identifiers::ConstantId;
use crate::identifiers::NomenclatureRowId;
use crate::identifiers::UploadRowId;
use crate::time::Timestamp;

/// A single named constant ingested for an upload.
///
/// # Invariants
/// - Exclusively owned by its `upload_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    /// Row identifier.
    pub id: ConstantId,
    /// Owning upload.
    pub upload_id: UploadRowId,
    /// Constant name.
    pub name: String,
    /// Optional synonym reported by the ERP.
    pub synonym: String,
    /// ERP-reported value type tag.
    pub r#type: String,
    /// Verbatim inner text/XML of the value element (spec §6).
    pub value: String,
    /// Ingestion time.
    pub created_at: Timestamp,
}

/// A row in a dynamic per-catalog table.
///
/// # Invariants
/// - `table_name` is the deterministic mapping of the original catalog name
///   (see [`crate::hashing::catalog_table_name`]); two items sent under the
///   same catalog name land in the same physical table (spec §8.10).
/// - `attributes_payload`/`table_parts_payload` are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Row identifier within the dynamic table.
    pub id: CatalogRowId,
    /// Owning upload.
    pub upload_id: UploadRowId,
    /// Physical table this row lives in.
    pub table_name: String,
    /// Source-system reference (stable identity within the source ERP).
    pub reference: String,
    /// Source-system code.
    pub code: String,
    /// Source-system display name.
    pub name: String,
    /// Verbatim inner XML/text of the attributes payload.
    pub attributes_payload: String,
    /// Verbatim inner XML/text of the table-parts payload.
    pub table_parts_payload: String,
    /// Ingestion time.
    pub created_at: Timestamp,
}

/// A composite nomenclature + optional characteristic item.
///
/// # Invariants
/// - `characteristic_reference`/`characteristic_name` are both `Some` or
///   both `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomenclatureItem {
    /// Row identifier.
    pub id: NomenclatureRowId,
    /// Owning upload.
    pub upload_id: UploadRowId,
    /// Base nomenclature reference.
    pub nomenclature_reference: String,
    /// Base nomenclature code.
    pub nomenclature_code: String,
    /// Base nomenclature name.
    pub nomenclature_name: String,
    /// Optional characteristic reference.
    pub characteristic_reference: Option<String>,
    /// Optional characteristic name.
    pub characteristic_name: Option<String>,
    /// Verbatim inner XML/text of the attributes payload.
    pub attributes_payload: String,
    /// Verbatim inner XML/text of the table-parts payload.
    pub table_parts_payload: String,
}

impl NomenclatureItem {
    /// Returns the effective display name: the characteristic name if
    /// present, otherwise the base nomenclature name.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.characteristic_name.as_deref().unwrap_or(&self.nomenclature_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_name_prefers_characteristic() {
        let item = NomenclatureItem {
            id: NomenclatureRowId(1),
            upload_id: UploadRowId(1),
            nomenclature_reference: "r1".into(),
            nomenclature_code: "c1".into(),
            nomenclature_name: "Молоток".into(),
            characteristic_reference: Some("cr1".into()),
            characteristic_name: Some("Молоток 500г".into()),
            attributes_payload: String::new(),
            table_parts_payload: String::new(),
        };
        assert_eq!(item.effective_name(), "Молоток 500г");
    }

    #[test]
    fn effective_name_falls_back_without_characteristic() {
        let item = NomenclatureItem {
            id: NomenclatureRowId(1),
            upload_id: UploadRowId(1),
            nomenclature_reference: "r1".into(),
            nomenclature_code: "c1".into(),
            nomenclature_name: "Молоток".into(),
            characteristic_reference: None,
            characteristic_name: None,
            attributes_payload: String::new(),
            table_parts_payload: String::new(),
        };
        assert_eq!(item.effective_name(), "Молоток");
    }
}
