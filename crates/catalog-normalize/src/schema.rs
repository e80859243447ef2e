// crates/catalog-normalize/src/schema.rs
// ============================================================================
// Module: Positional Extractor & Schema Registry
// Description: Declarative `position -> {name, type, required, validator,
// transformer, default}` mapping over delimiter-split tokens, with
// predefined schemas for common category families (spec §4.2).
// Purpose: Let a caller that already knows a source system's naming
// convention (e.g. "electronics names are always `brand/model/wattage`")
// extract attributes positionally instead of relying on regex heuristics.
// Dependencies: catalog-core, once_cell
// ============================================================================

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use catalog_core::domain::ItemAttributeType;

use crate::name_normalizer::ExtractedAttribute;

/// How a field's raw token is checked before acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValidator {
    /// Any non-empty token is accepted.
    NonEmpty,
    /// The token must parse as a number (integer or decimal).
    Numeric,
    /// No validation performed.
    Any,
}

impl FieldValidator {
    /// Returns whether `token` satisfies this validator.
    #[must_use]
    pub fn accepts(self, token: &str) -> bool {
        match self {
            Self::Any => true,
            Self::NonEmpty => !token.trim().is_empty(),
            Self::Numeric => token.trim().replace(',', ".").parse::<f64>().is_ok(),
        }
    }
}

/// How a field's raw token is reshaped before becoming an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransformer {
    /// Token is used verbatim.
    Identity,
    /// Token is lowercased.
    Lowercase,
    /// Token is trimmed of surrounding whitespace.
    Trim,
}

impl FieldTransformer {
    /// Applies this transformer to `token`.
    #[must_use]
    pub fn apply(self, token: &str) -> String {
        match self {
            Self::Identity => token.to_string(),
            Self::Lowercase => token.to_lowercase(),
            Self::Trim => token.trim().to_string(),
        }
    }
}

/// Declarative description of one positional field (spec §4.2).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Canonical attribute name this position maps to.
    pub name: String,
    /// Attribute type this position produces.
    pub attribute_type: ItemAttributeType,
    /// Whether a missing/rejected token at this position is an error
    /// (surfaced as a lower-confidence attribute, never a hard failure,
    /// since NRM must not fail a whole row over one field).
    pub required: bool,
    /// Validator applied to the raw token.
    pub validator: FieldValidator,
    /// Transformer applied to an accepted token.
    pub transformer: FieldTransformer,
    /// Value used when the position is missing and `required` is false.
    pub default: Option<String>,
}

/// A positional schema: split `delimiter` and map each resulting token to
/// a [`FieldSpec`] by index.
#[derive(Debug, Clone)]
pub struct PositionalSchema {
    /// Delimiter tokens are split on.
    pub delimiter: char,
    /// Field descriptions, one per expected position.
    pub fields: Vec<FieldSpec>,
}

/// Extracts attributes from `input` using `schema`'s positional field map
/// (spec §4.2).
///
/// # Invariants
/// - A field position beyond the number of tokens present uses `default`
///   (if any) rather than panicking or dropping the row.
#[must_use]
pub fn extract_positional(input: &str, schema: &PositionalSchema) -> Vec<ExtractedAttribute> {
    let tokens: Vec<&str> = input.split(schema.delimiter).map(str::trim).collect();
    let mut attributes = Vec::new();
    for (index, field) in schema.fields.iter().enumerate() {
        let raw = tokens.get(index).copied();
        let accepted = raw.filter(|token| field.validator.accepts(token));
        let value = match (accepted, &field.default) {
            (Some(token), _) => Some(field.transformer.apply(token)),
            (None, Some(default)) => Some(default.clone()),
            (None, None) => None,
        };
        if let Some(value) = value {
            attributes.push(ExtractedAttribute {
                attribute_type: field.attribute_type,
                attribute_name: field.name.clone(),
                attribute_value: value,
                unit: None,
                original_text: raw.unwrap_or_default().to_string(),
                confidence: if raw.is_some() { 1.0 } else { 0.5 },
            });
        }
    }
    attributes
}

/// Predefined schemas keyed by category family (spec §4.2 "general,
/// electronics, furniture, tools, building").
pub static SCHEMA_REGISTRY: Lazy<BTreeMap<&'static str, PositionalSchema>> = Lazy::new(|| {
    let mut registry = BTreeMap::new();
    registry.insert(
        "general",
        PositionalSchema {
            delimiter: '/',
            fields: vec![
                FieldSpec { name: "brand".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Trim, default: None },
                FieldSpec { name: "model".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Trim, default: None },
            ],
        },
    );
    registry.insert(
        "electronics",
        PositionalSchema {
            delimiter: '/',
            fields: vec![
                FieldSpec { name: "brand".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Trim, default: None },
                FieldSpec { name: "model".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Trim, default: None },
                FieldSpec { name: "power".to_string(), attribute_type: ItemAttributeType::NumericValue, required: false, validator: FieldValidator::Numeric, transformer: FieldTransformer::Trim, default: None },
            ],
        },
    );
    registry.insert(
        "furniture",
        PositionalSchema {
            delimiter: '/',
            fields: vec![
                FieldSpec { name: "material".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Lowercase, default: None },
                FieldSpec { name: "color".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Lowercase, default: Some("unspecified".to_string()) },
            ],
        },
    );
    registry.insert(
        "tools",
        PositionalSchema {
            delimiter: '/',
            fields: vec![
                FieldSpec { name: "type".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Lowercase, default: None },
                FieldSpec { name: "weight".to_string(), attribute_type: ItemAttributeType::NumericValue, required: false, validator: FieldValidator::Numeric, transformer: FieldTransformer::Trim, default: None },
            ],
        },
    );
    registry.insert(
        "building",
        PositionalSchema {
            delimiter: '/',
            fields: vec![
                FieldSpec { name: "material".to_string(), attribute_type: ItemAttributeType::TextValue, required: false, validator: FieldValidator::NonEmpty, transformer: FieldTransformer::Lowercase, default: None },
                FieldSpec { name: "thickness".to_string(), attribute_type: ItemAttributeType::NumericValue, required: false, validator: FieldValidator::Numeric, transformer: FieldTransformer::Trim, default: None },
            ],
        },
    );
    registry
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fields_by_position() {
        let schema = SCHEMA_REGISTRY.get("electronics").expect("schema present");
        let attributes = extract_positional("Bosch/GSB 13/600", schema);
        assert!(attributes.iter().any(|a| a.attribute_name == "brand" && a.attribute_value == "Bosch"));
        assert!(attributes.iter().any(|a| a.attribute_name == "power" && a.attribute_value == "600"));
    }

    #[test]
    fn rejected_numeric_field_falls_back_to_default_or_is_skipped() {
        let schema = SCHEMA_REGISTRY.get("tools").expect("schema present");
        let attributes = extract_positional("Молоток/не-число", schema);
        assert!(attributes.iter().any(|a| a.attribute_name == "type"));
        assert!(!attributes.iter().any(|a| a.attribute_name == "weight"));
    }

    #[test]
    fn missing_position_uses_default_when_present() {
        let schema = SCHEMA_REGISTRY.get("furniture").expect("schema present");
        let attributes = extract_positional("дерево", schema);
        let color = attributes.iter().find(|a| a.attribute_name == "color").expect("default applied");
        assert_eq!(color.attribute_value, "unspecified");
    }

    #[test]
    fn all_predefined_schemas_are_registered() {
        for key in ["general", "electronics", "furniture", "tools", "building"] {
            assert!(SCHEMA_REGISTRY.contains_key(key), "missing schema {key}");
        }
    }
}
