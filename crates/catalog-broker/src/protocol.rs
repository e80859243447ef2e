// crates/catalog-broker/src/protocol.rs
// ============================================================================
// Module: ERP XML Protocol
// Description: Request/response types for the nine ISM endpoints and the
// XML (de)serialization between them (spec §6).
// Purpose: Isolate the wire format from `ism.rs` so the state machine logic
// reads as plain orchestration over typed structs, not string scanning.
// Dependencies: quick-xml, time, catalog-core
// ============================================================================

//! ## Overview
//! Two read paths are needed because the protocol mixes "ordinary" fields
//! (read with [`quick_xml::Reader`], unescaped like any other text node) with
//! fields whose inner XML/text must survive **verbatim** — `constant.value`,
//! `catalog/item.attributes_xml`, `catalog/item.table_parts_xml` (spec §6).
//! [`read_field`] handles the former; [`read_verbatim`] scans for the raw
//! substring between a start and matching end tag, tracking same-name
//! nesting depth the way [`crate::tokenizer`]-style scanners track bracket
//! depth, so a payload that itself contains nested `<attributes_xml>`-shaped
//! markup is not truncated at the first close tag.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::BrokerError;

/// Reads the unescaped text content of the first `<tag>...</tag>` found at
/// any depth, or `None` if the tag is absent or empty.
pub(crate) fn read_field(xml: &str, tag: &str) -> Result<Option<String>, BrokerError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) if start.name().as_ref() == tag.as_bytes() => inside = true,
            Event::Text(node) if inside => text.push_str(&node.unescape()?),
            Event::End(end) if end.name().as_ref() == tag.as_bytes() => {
                return Ok(if text.is_empty() { None } else { Some(text) });
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Reads `tag`'s required text content.
///
/// # Errors
///
/// Returns [`BrokerError::MissingField`] if `tag` is absent or empty.
pub(crate) fn require_field(xml: &str, tag: &str) -> Result<String, BrokerError> {
    read_field(xml, tag)?.ok_or_else(|| BrokerError::MissingField(tag.to_string()))
}

/// Scans `xml` for the raw substring between `<tag ...>` and its matching
/// `</tag>`, preserving any nested markup verbatim instead of unescaping it
/// (spec §6 "inner text/XML is preserved verbatim").
///
/// # Invariants
/// - Nested occurrences of the same tag name inside the element increase a
///   depth counter, so the scan does not stop at the first close tag it
///   sees (mirrors the depth-tracked scan in
///   [`crate::tests`]/`catalog-normalize::tokenizer`).
pub(crate) fn read_verbatim(xml: &str, tag: &str) -> Option<String> {
    let open_prefix = format!("<{tag}");
    let open_start = xml.find(&open_prefix)?;
    let open_end = xml[open_start..].find('>')? + open_start;
    if xml.as_bytes()[open_end - 1] == b'/' {
        return Some(String::new());
    }
    let content_start = open_end + 1;
    let close_tag = format!("</{tag}>");
    let open_tag_scan = format!("<{tag}");

    let mut depth = 1usize;
    let mut cursor = content_start;
    loop {
        let next_close = xml[cursor..].find(&close_tag).map(|i| i + cursor)?;
        let next_open = xml[cursor..next_close].find(&open_tag_scan).map(|i| i + cursor);
        match next_open {
            Some(pos) => {
                depth += 1;
                cursor = pos + open_tag_scan.len();
            }
            None => {
                depth -= 1;
                if depth == 0 {
                    return Some(xml[content_start..next_close].trim().to_string());
                }
                cursor = next_close + close_tag.len();
            }
        }
    }
}

/// Reads the `upload_uuid` field shared by every request body, including the
/// two endpoints (`/metadata`, `/complete`) that carry no other field the
/// state machine needs parsed (spec §6).
///
/// # Errors
///
/// Returns [`BrokerError::MissingField`] if `upload_uuid` is absent.
pub fn read_upload_uuid(xml: &str) -> Result<String, BrokerError> {
    require_field(xml, "upload_uuid")
}

/// Parsed `POST /handshake` request body (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// ERP version string.
    pub version_erp: String,
    /// ERP configuration name.
    pub config_name: String,
    /// Directly supplied database id, if the producer already knows it.
    pub database_id: Option<i64>,
    /// Reporting workstation name.
    pub computer_name: String,
    /// Reporting OS user name.
    pub user_name: String,
    /// ERP configuration version.
    pub config_version: String,
    /// 1-based iteration number.
    pub iteration_number: u32,
    /// Iteration label.
    pub iteration_label: String,
    /// Operator/programmer identity.
    pub programmer: String,
    /// Free-text purpose.
    pub purpose: String,
    /// Parent upload row id this upload supersedes, if any.
    pub parent_upload_id: Option<i64>,
}

impl HandshakeRequest {
    /// Parses a handshake request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::XmlParse`] on malformed XML,
    /// [`BrokerError::MissingField`] if a required field is absent.
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            version_erp: require_field(xml, "version_erp")?,
            config_name: require_field(xml, "config_name")?,
            database_id: read_field(xml, "database_id")?.and_then(|v| v.parse().ok()),
            computer_name: require_field(xml, "computer_name")?,
            user_name: require_field(xml, "user_name")?,
            config_version: require_field(xml, "config_version")?,
            iteration_number: require_field(xml, "iteration_number")?
                .parse()
                .map_err(|_| BrokerError::MissingField("iteration_number".to_string()))?,
            iteration_label: read_field(xml, "iteration_label")?.unwrap_or_default(),
            programmer: read_field(xml, "programmer")?.unwrap_or_default(),
            purpose: read_field(xml, "purpose")?.unwrap_or_default(),
            parent_upload_id: read_field(xml, "parent_upload_id")?.and_then(|v| v.parse().ok()),
        })
    }
}

/// `POST /handshake` response body (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Minted upload identifier.
    pub upload_uuid: String,
    /// Resolved client name, if a database was matched.
    pub client_name: Option<String>,
    /// Resolved project name, if a database was matched.
    pub project_name: Option<String>,
    /// Resolved database display name, if a database was matched.
    pub database_name: Option<String>,
    /// Resolved database store file path, if a database was matched.
    pub database_path: Option<String>,
    /// Resolved database row id, if a database was matched.
    pub database_id: Option<i64>,
    /// Human-readable status message.
    pub message: String,
}

impl HandshakeResponse {
    /// Renders the success envelope (spec §6).
    #[must_use]
    pub fn to_xml(&self, timestamp: &str) -> String {
        format!(
            "<response><success>true</success><upload_uuid>{}</upload_uuid>{}{}{}{}{}<message>{}</message><timestamp>{timestamp}</timestamp></response>",
            escape(&self.upload_uuid),
            opt_element("client_name", self.client_name.as_deref()),
            opt_element("project_name", self.project_name.as_deref()),
            opt_element("database_name", self.database_name.as_deref()),
            opt_element("database_path", self.database_path.as_deref()),
            opt_int_element("database_id", self.database_id),
            escape(&self.message),
        )
    }
}

/// `POST /constant` request body (spec §6). `value` is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantRequest {
    /// Owning upload identifier.
    pub upload_uuid: String,
    /// Constant name.
    pub name: String,
    /// Optional synonym.
    pub synonym: String,
    /// ERP-reported value type tag.
    pub r#type: String,
    /// Verbatim inner XML/text of the `<value>` element.
    pub value: String,
}

impl ConstantRequest {
    /// Parses a constant request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingField`] if a required field is absent.
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            upload_uuid: require_field(xml, "upload_uuid")?,
            name: require_field(xml, "name")?,
            synonym: read_field(xml, "synonym")?.unwrap_or_default(),
            r#type: read_field(xml, "type")?.unwrap_or_default(),
            value: read_verbatim(xml, "value").unwrap_or_default(),
        })
    }
}

/// `POST /catalog/meta` request body (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMetaRequest {
    /// Owning upload identifier.
    pub upload_uuid: String,
    /// Catalog display name.
    pub name: String,
    /// Optional synonym.
    pub synonym: String,
}

impl CatalogMetaRequest {
    /// Parses a catalog-meta request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingField`] if a required field is absent.
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            upload_uuid: require_field(xml, "upload_uuid")?,
            name: require_field(xml, "name")?,
            synonym: read_field(xml, "synonym")?.unwrap_or_default(),
        })
    }
}

/// One item within a `<catalog/item>` or `<catalog/items>` body (spec §6).
/// `attributes_xml`/`table_parts_xml` are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItemFields {
    /// Source-system reference.
    pub reference: String,
    /// Source-system code.
    pub code: String,
    /// Source-system display name.
    pub name: String,
    /// Verbatim inner XML/text of `<attributes_xml>`.
    pub attributes_xml: String,
    /// Verbatim inner XML/text of `<table_parts_xml>`.
    pub table_parts_xml: String,
}

impl CatalogItemFields {
    fn from_item_xml(xml: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            reference: require_field(xml, "reference")?,
            code: read_field(xml, "code")?.unwrap_or_default(),
            name: require_field(xml, "name")?,
            attributes_xml: read_verbatim(xml, "attributes_xml").unwrap_or_default(),
            table_parts_xml: read_verbatim(xml, "table_parts_xml").unwrap_or_default(),
        })
    }
}

/// `POST /catalog/item` request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItemRequest {
    /// Owning upload identifier.
    pub upload_uuid: String,
    /// Target catalog name.
    pub catalog_name: String,
    /// The single item's fields.
    pub item: CatalogItemFields,
}

impl CatalogItemRequest {
    /// Parses a single catalog-item request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingField`] if a required field is absent.
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        Ok(Self {
            upload_uuid: require_field(xml, "upload_uuid")?,
            catalog_name: require_field(xml, "catalog_name")?,
            item: CatalogItemFields::from_item_xml(xml)?,
        })
    }
}

/// `POST /catalog/items` batch request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItemsRequest {
    /// Owning upload identifier.
    pub upload_uuid: String,
    /// Target catalog name shared by every item in the batch.
    pub catalog_name: String,
    /// The batch's items.
    pub items: Vec<CatalogItemFields>,
}

impl CatalogItemsRequest {
    /// Parses a batch catalog-items request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingField`] if a required top-level field is
    /// absent; a malformed individual `<item>` is skipped rather than
    /// failing the whole batch (spec §4.1 "all-or-nothing per row").
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        let upload_uuid = require_field(xml, "upload_uuid")?;
        let catalog_name = require_field(xml, "catalog_name")?;
        let items = split_elements(xml, "item").into_iter().filter_map(|item_xml| CatalogItemFields::from_item_xml(&item_xml).ok()).collect();
        Ok(Self { upload_uuid, catalog_name, items })
    }
}

/// One item within a `<nomenclature/batch>` body (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomenclatureItemFields {
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
    /// Verbatim inner XML/text of `<attributes_xml>`.
    pub attributes_xml: String,
    /// Verbatim inner XML/text of `<table_parts_xml>`.
    pub table_parts_xml: String,
}

/// `POST /nomenclature/batch` request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomenclatureBatchRequest {
    /// Owning upload identifier.
    pub upload_uuid: String,
    /// The batch's items.
    pub items: Vec<NomenclatureItemFields>,
}

impl NomenclatureBatchRequest {
    /// Parses a nomenclature batch request from its XML body.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingField`] if `upload_uuid` is absent.
    pub fn from_xml(xml: &str) -> Result<Self, BrokerError> {
        let upload_uuid = require_field(xml, "upload_uuid")?;
        let items = split_elements(xml, "item")
            .into_iter()
            .filter_map(|item_xml| {
                Some(NomenclatureItemFields {
                    nomenclature_reference: require_field(&item_xml, "nomenclature_reference").ok()?,
                    nomenclature_code: read_field(&item_xml, "nomenclature_code").ok().flatten().unwrap_or_default(),
                    nomenclature_name: require_field(&item_xml, "nomenclature_name").ok()?,
                    characteristic_reference: read_field(&item_xml, "characteristic_reference").ok().flatten(),
                    characteristic_name: read_field(&item_xml, "characteristic_name").ok().flatten(),
                    attributes_xml: read_verbatim(&item_xml, "attributes_xml").unwrap_or_default(),
                    table_parts_xml: read_verbatim(&item_xml, "table_parts_xml").unwrap_or_default(),
                })
            })
            .collect();
        Ok(Self { upload_uuid, items })
    }
}

/// A batch-processing response (`catalog/items`, `nomenclature/batch`; spec
/// §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResponse {
    /// Rows processed successfully.
    pub processed_count: u64,
    /// Rows that failed and were skipped.
    pub failed_count: u64,
}

impl BatchResponse {
    /// Renders the success envelope.
    #[must_use]
    pub fn to_xml(&self, timestamp: &str) -> String {
        format!(
            "<response><success>true</success><processed_count>{}</processed_count><failed_count>{}</failed_count><timestamp>{timestamp}</timestamp></response>",
            self.processed_count, self.failed_count
        )
    }
}

/// A simple `{success, message, timestamp}` envelope, shared by `metadata`,
/// `catalog/meta`, and `complete` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Human-readable status message.
    pub message: String,
    /// Opaque identifier carried for backward compatibility (e.g. the
    /// catalog id `catalog/meta` returns); `None` where the endpoint has
    /// none.
    pub opaque_id: Option<String>,
}

impl StatusResponse {
    /// Renders the success envelope.
    #[must_use]
    pub fn to_xml(&self, timestamp: &str) -> String {
        format!(
            "<response><success>true</success>{}<message>{}</message><timestamp>{timestamp}</timestamp></response>",
            opt_element("catalog_id", self.opaque_id.as_deref()),
            escape(&self.message),
        )
    }
}

/// Renders the shared `{success:false, error, message, timestamp}` error
/// envelope (spec §6, §7).
#[must_use]
pub fn error_envelope(error_code: &str, message: &str, timestamp: &str) -> String {
    format!(
        "<response><success>false</success><error>{}</error><message>{}</message><timestamp>{timestamp}</timestamp></response>",
        escape(error_code),
        escape(message),
    )
}

fn opt_element(tag: &str, value: Option<&str>) -> String {
    value.map_or_else(String::new, |v| format!("<{tag}>{}</{tag}>", escape(v)))
}

fn opt_int_element(tag: &str, value: Option<i64>) -> String {
    value.map_or_else(String::new, |v| format!("<{tag}>{v}</{tag}>"))
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Splits every top-level `<tag>...</tag>` occurrence out of `xml`,
/// returning each element's full text (tags included) so callers can run
/// `read_field`/`read_verbatim` against each one independently.
fn split_elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while let Some(rel_start) = xml[cursor..].find(&open) {
        let start = cursor + rel_start;
        let Some(rel_end) = xml[start..].find(&close) else { break };
        let end = start + rel_end + close.len();
        out.push(xml[start..end].to_string());
        cursor = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_parses_required_and_optional_fields() {
        let xml = "<handshake><version_erp>8.3</version_erp><config_name>Trade</config_name>\
            <computer_name>WS-1</computer_name><user_name>erp</user_name>\
            <config_version>2.1</config_version><iteration_number>1</iteration_number>\
            <iteration_label>initial</iteration_label><programmer>ivanov</programmer>\
            <purpose>sync</purpose></handshake>";
        let parsed = HandshakeRequest::from_xml(xml).expect("parses");
        assert_eq!(parsed.version_erp, "8.3");
        assert_eq!(parsed.iteration_number, 1);
        assert_eq!(parsed.database_id, None);
    }

    #[test]
    fn handshake_missing_required_field_errors() {
        let xml = "<handshake><config_name>Trade</config_name></handshake>";
        assert!(HandshakeRequest::from_xml(xml).is_err());
    }

    #[test]
    fn verbatim_value_preserves_nested_markup() {
        let xml = "<constant><upload_uuid>u</upload_uuid><name>n</name>\
            <value><item>a</item><item>b</item></value></constant>";
        let parsed = ConstantRequest::from_xml(xml).expect("parses");
        assert_eq!(parsed.value, "<item>a</item><item>b</item>");
    }

    #[test]
    fn verbatim_handles_self_closing_element() {
        let xml = "<constant><upload_uuid>u</upload_uuid><name>n</name><value/></constant>";
        let parsed = ConstantRequest::from_xml(xml).expect("parses");
        assert_eq!(parsed.value, "");
    }

    #[test]
    fn catalog_items_batch_splits_each_item() {
        let xml = "<catalog_items><upload_uuid>u</upload_uuid><catalog_name>Goods</catalog_name>\
            <item><reference>r1</reference><name>n1</name></item>\
            <item><reference>r2</reference><name>n2</name></item></catalog_items>";
        let parsed = CatalogItemsRequest::from_xml(xml).expect("parses");
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[1].reference, "r2");
    }

    #[test]
    fn error_envelope_renders_all_fields() {
        let xml = error_envelope("not_found", "upload missing", "2026-01-01T00:00:00Z");
        assert!(xml.contains("<success>false</success>"));
        assert!(xml.contains("<error>not_found</error>"));
    }
}
