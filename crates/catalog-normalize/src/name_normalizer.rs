// crates/catalog-normalize/src/name_normalizer.rs
// ============================================================================
// Module: Name Normalizer (NN)
// Description: Deterministic text cleaner + attribute extractor (spec §4.2).
// Purpose: Turn a free-text source name into a canonical `normalized_name`
// plus the structured attributes it encoded (dimensions, weights, codes),
// without any network call — CAT and AIN both build on this pure function.
// Dependencies: regex, once_cell, catalog-core
// ============================================================================

//! ## Overview
//! A seven-step pipeline (spec §4.2), each step consuming the previous
//! step's output:
//! 1. Lowercase.
//! 2. Strip a leading article code (`letters(>=2) + digits + letters* +
//!    digits`).
//! 3. Strip technical codes (`UU-99...`).
//! 4. Strip dimensions (`NxM`, Latin and Cyrillic `x`).
//! 5. Strip "number+unit" pairs.
//! 6. Strip standalone numbers.
//! 7. Collapse whitespace and trim.
//!
//! Attribute extraction (spec §4.2 "Attribute extraction runs on the
//! original string") runs independently over the untouched input so every
//! [`ExtractedAttribute::original_text`] is guaranteed to be an exact
//! substring of what was passed in (spec §8.5).

use once_cell::sync::Lazy;
use regex::Regex;

use catalog_core::domain::ItemAttributeType;

/// An attribute extracted from a source name, not yet attached to a
/// persisted [`catalog_core::domain::NormalizedData`] row (that id is only
/// known once NRM inserts the row).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAttribute {
    /// Attribute kind.
    pub attribute_type: ItemAttributeType,
    /// Canonical attribute name (`"weight"`, `"thickness"`, ...).
    pub attribute_name: String,
    /// Extracted value, as text.
    pub attribute_value: String,
    /// Unit of measure, if applicable.
    pub unit: Option<String>,
    /// Exact substring of the input this attribute was extracted from.
    pub original_text: String,
    /// Extraction confidence in `[0, 1]`; directly-matched patterns score
    /// 1.0, related/contextual attributes score 0.75-0.9 (spec §4.2).
    pub confidence: f64,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationResult {
    /// Cleaned, canonical name.
    pub normalized_name: String,
    /// Attributes extracted from the original input.
    pub attributes: Vec<ExtractedAttribute>,
}

/// Window, in bytes, scanned after a primary match for related attributes
/// (spec §4.2 "bounded window, e.g. next <=100 chars").
const RELATED_CONTEXT_WINDOW: usize = 100;

static ARTICLE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-zа-яё]{2,}\d+[a-zа-яё]*\d*)(\s+|$)").expect("valid regex"));

static TECHNICAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[a-zа-яё]{1,4}-\d{2,}\b").expect("valid regex"));

static DIMENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?\s*[xх]\s*\d+(?:[.,]\d+)?(?:\s*[xх]\s*\d+(?:[.,]\d+)?)?").expect("valid regex"));

static NUMBER_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+(?:[.,]\d+)?)\s*(мм|см|кг|квт|ватт|мл|вт|мин|сек|гр|шт|mm|cm|kg|watt|kw|min|sec|м|г|л|в|а|ч|%|m|g|l|w|v|a|h)\b",
    )
    .expect("valid regex")
});

static STANDALONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?\b").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static TRAILING_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s,.;:\-/]+|[\s,.;:\-/]+$").expect("valid regex"));

/// Maps a matched unit token to its canonical attribute name (spec §4.2).
fn unit_attribute_name(unit: &str) -> &'static str {
    match unit.to_lowercase().as_str() {
        "mm" | "cm" | "m" | "мм" | "см" | "м" => "thickness",
        "kg" | "g" | "кг" | "г" | "гр" => "weight",
        "l" | "ml" | "л" | "мл" => "volume",
        "w" | "kw" | "watt" | "вт" | "квт" | "ватт" => "power",
        "v" | "a" | "в" | "а" => "electrical",
        "h" | "min" | "sec" | "ч" | "мин" | "сек" => "duration",
        "шт" => "quantity",
        "%" => "percentage",
        _ => "measurement",
    }
}

/// Runs the full NN pipeline (spec §4.2).
///
/// # Invariants
/// - Idempotent: `normalize(normalize(x).normalized_name).normalized_name ==
///   normalize(x).normalized_name` (spec §8.4).
#[must_use]
pub fn normalize(raw_name: &str) -> NormalizationResult {
    let attributes = extract_attributes(raw_name);

    let mut working = raw_name.to_lowercase();
    working = strip_leading_article_code(&working);
    working = TECHNICAL_CODE.replace_all(&working, " ").into_owned();
    working = DIMENSION.replace_all(&working, " ").into_owned();
    working = NUMBER_UNIT.replace_all(&working, " ").into_owned();
    working = STANDALONE_NUMBER.replace_all(&working, " ").into_owned();
    let normalized_name = collapse_and_trim(&working);

    NormalizationResult { normalized_name, attributes }
}

/// Strips a leading article code, spec step 2. Separate from the global
/// [`TECHNICAL_CODE`] replacement since this pattern is anchored at the
/// start of the string and has no required separator.
fn strip_leading_article_code(text: &str) -> String {
    if let Some(captures) = ARTICLE_CODE.captures(text) {
        let matched = captures.get(0).expect("capture 0 always present");
        return text[matched.end()..].to_string();
    }
    text.to_string()
}

/// Collapses runs of whitespace to single spaces and trims surrounding
/// punctuation (spec step 7).
fn collapse_and_trim(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    TRAILING_PUNCTUATION.replace_all(collapsed.trim(), "").trim().to_string()
}

/// Extracts attributes from `raw_name`, guaranteeing every
/// [`ExtractedAttribute::original_text`] is an exact substring of
/// `raw_name` (spec §8.5).
fn extract_attributes(raw_name: &str) -> Vec<ExtractedAttribute> {
    let mut attributes = Vec::new();

    if let Some(captures) = ARTICLE_CODE.captures(raw_name) {
        let matched = captures.get(1).expect("capture 1 always present");
        attributes.push(ExtractedAttribute {
            attribute_type: ItemAttributeType::ArticleCode,
            attribute_name: "article_code".to_string(),
            attribute_value: matched.as_str().to_string(),
            unit: None,
            original_text: matched.as_str().to_string(),
            confidence: 1.0,
        });
        push_related(raw_name, matched.end(), &mut attributes, &["x", "х", "тип", "type"], 0.8);
    }

    for matched in TECHNICAL_CODE.find_iter(raw_name) {
        attributes.push(ExtractedAttribute {
            attribute_type: ItemAttributeType::TechnicalCode,
            attribute_name: "technical_code".to_string(),
            attribute_value: matched.as_str().to_string(),
            unit: None,
            original_text: matched.as_str().to_string(),
            confidence: 1.0,
        });
        push_related_numeric(raw_name, matched.end(), &mut attributes, 0.75);
    }

    for matched in DIMENSION.find_iter(raw_name) {
        let parts = split_dimension(matched.as_str());
        if let [width, height] = parts.as_slice() {
            attributes.push(ExtractedAttribute {
                attribute_type: ItemAttributeType::Dimension,
                attribute_name: "width".to_string(),
                attribute_value: (*width).to_string(),
                unit: None,
                original_text: matched.as_str().to_string(),
                confidence: 1.0,
            });
            attributes.push(ExtractedAttribute {
                attribute_type: ItemAttributeType::Dimension,
                attribute_name: "height".to_string(),
                attribute_value: (*height).to_string(),
                unit: None,
                original_text: matched.as_str().to_string(),
                confidence: 1.0,
            });
        }
        push_related(raw_name, matched.end(), &mut attributes, &["сталь", "алюминий", "пластик", "дерево", "steel", "aluminum", "plastic"], 0.8);
        push_related(raw_name, matched.end(), &mut attributes, &["красный", "черный", "белый", "синий", "red", "black", "white", "blue"], 0.8);
    }

    for captures in NUMBER_UNIT.captures_iter(raw_name) {
        let full = captures.get(0).expect("capture 0 always present");
        let value = captures.get(1).expect("capture 1 always present").as_str();
        let unit = captures.get(2).expect("capture 2 always present").as_str();
        attributes.push(ExtractedAttribute {
            attribute_type: ItemAttributeType::NumericValue,
            attribute_name: unit_attribute_name(unit).to_string(),
            attribute_value: value.to_string(),
            unit: Some(unit.to_string()),
            original_text: full.as_str().to_string(),
            confidence: 1.0,
        });
    }

    attributes
}

/// Splits a matched dimension string like `"3x2.5"` into its numeric parts.
fn split_dimension(matched: &str) -> Vec<&str> {
    matched.split(['x', 'х']).map(str::trim).collect()
}

/// Scans up to [`RELATED_CONTEXT_WINDOW`] bytes following `start` for any
/// of `keywords`, emitting a related [`ItemAttributeType::TextValue`]
/// attribute at `confidence` if found (spec §4.2 "related attributes").
fn push_related(raw_name: &str, start: usize, attributes: &mut Vec<ExtractedAttribute>, keywords: &[&str], confidence: f64) {
    let end = (start + RELATED_CONTEXT_WINDOW).min(raw_name.len());
    let Some(window) = raw_name.get(start..end) else { return };
    let lowered = window.to_lowercase();
    for keyword in keywords {
        if let Some(offset) = lowered.find(keyword) {
            let original = &window[offset..offset + keyword.len()];
            attributes.push(ExtractedAttribute {
                attribute_type: ItemAttributeType::TextValue,
                attribute_name: "related".to_string(),
                attribute_value: original.to_string(),
                unit: None,
                original_text: original.to_string(),
                confidence,
            });
            return;
        }
    }
}

/// Scans the context window after a technical code for an additional
/// numeric parameter (spec §4.2 "technical codes attract additional
/// numeric parameters").
fn push_related_numeric(raw_name: &str, start: usize, attributes: &mut Vec<ExtractedAttribute>, confidence: f64) {
    let end = (start + RELATED_CONTEXT_WINDOW).min(raw_name.len());
    let Some(window) = raw_name.get(start..end) else { return };
    if let Some(matched) = STANDALONE_NUMBER.find(window) {
        attributes.push(ExtractedAttribute {
            attribute_type: ItemAttributeType::NumericValue,
            attribute_name: "parameter".to_string(),
            attribute_value: matched.as_str().to_string(),
            unit: None,
            original_text: matched.as_str().to_string(),
            confidence,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_name_normalization_scenario() {
        let result = normalize("МОЛОТАК СТРОИТЕЛЬНЫЙ 500гр ER-00013004");
        assert_eq!(result.normalized_name, "молотак строительный");
        assert!(result.attributes.iter().any(|a| a.attribute_type == ItemAttributeType::TechnicalCode && a.attribute_value == "ER-00013004"));
        assert!(result.attributes.iter().any(|a| a.attribute_name == "weight" && a.attribute_value == "500" && a.unit.as_deref() == Some("гр")));
    }

    #[test]
    fn s2_dimensional_extraction_scenario() {
        let result = normalize("Кабель ВВГнг 3х2.5 100м");
        assert_eq!(result.normalized_name, "кабель ввгнг");
        assert!(result.attributes.iter().any(|a| a.attribute_name == "width" && a.attribute_value == "3"));
        assert!(result.attributes.iter().any(|a| a.attribute_name == "height" && a.attribute_value == "2.5"));
        assert!(result.attributes.iter().any(|a| a.attribute_name == "thickness" && a.attribute_value == "100" && a.unit.as_deref() == Some("м")));
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = ["МОЛОТАК СТРОИТЕЛЬНЫЙ 500гр ER-00013004", "Кабель ВВГнг 3х2.5 100м", "Простое Название", ""];
        for input in inputs {
            let once = normalize(input).normalized_name;
            let twice = normalize(&once).normalized_name;
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn attribute_original_text_is_substring_of_input() {
        let input = "Молоток 500г ER-00013004 3х2.5";
        let result = normalize(input);
        for attribute in &result.attributes {
            assert!(input.contains(&attribute.original_text), "{:?} not found in {input:?}", attribute.original_text);
        }
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        let result = normalize("");
        assert_eq!(result.normalized_name, "");
        assert!(result.attributes.is_empty());
    }
}
