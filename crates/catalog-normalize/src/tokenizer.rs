// crates/catalog-normalize/src/tokenizer.rs
// ============================================================================
// Module: Contextual Tokenizer
// Description: Depth-tracked scanner that separates a name's main text from
// its bracketed attribute fragments (spec §4.2 "contextual tokenizer").
// Purpose: Handle names like `"Розетка (IP44, цвет:белый)"` where
// parenthesized content carries structured key:value attributes that the
// regex pipeline in `name_normalizer` is not shaped to pull out.
// Dependencies: catalog-core
// ============================================================================

//! ## Overview
//! A single left-to-right scan tracks paren depth. Depth-0 characters are
//! emitted as one `(0, text)` token; entering `(` opens a new depth-1 token
//! that accumulates until its matching `)`; nested parens increase depth
//! further. Within a depth >= 1 token, a `key:value` or `key=value`
//! fragment (comma or depth-boundary separated) becomes a typed attribute
//! instead of a plain bracketed token.

use catalog_core::domain::ItemAttributeType;

use crate::name_normalizer::ExtractedAttribute;

/// One token produced by [`tokenize`], tagged with its paren depth.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthToken {
    /// Paren nesting depth this token was scanned at (0 = top level).
    pub depth: usize,
    /// The token's text, trimmed of surrounding whitespace.
    pub text: String,
}

/// Result of tokenizing a name with [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeResult {
    /// Depth-0 text with bracketed fragments removed, whitespace collapsed.
    pub main_text: String,
    /// Every token produced, in scan order, including depth 0.
    pub tokens: Vec<DepthToken>,
    /// Attributes decoded from `key:value`/`key=value` fragments found at
    /// depth >= 1.
    pub attributes: Vec<ExtractedAttribute>,
}

/// Scans `input`, separating top-level text from bracketed fragments (spec
/// §4.2).
#[must_use]
pub fn tokenize(input: &str) -> TokenizeResult {
    let mut tokens = Vec::new();
    let mut attributes = Vec::new();
    let mut depth: usize = 0;
    let mut current = String::new();
    let mut main_text = String::new();

    for ch in input.chars() {
        match ch {
            '(' => {
                flush_token(depth, &mut current, &mut tokens, &mut attributes, &mut main_text);
                depth += 1;
            }
            ')' => {
                flush_token(depth, &mut current, &mut tokens, &mut attributes, &mut main_text);
                depth = depth.saturating_sub(1);
            }
            ',' if depth >= 1 => {
                flush_token(depth, &mut current, &mut tokens, &mut attributes, &mut main_text);
            }
            _ => current.push(ch),
        }
    }
    flush_token(depth, &mut current, &mut tokens, &mut attributes, &mut main_text);

    let collapsed = main_text.split_whitespace().collect::<Vec<_>>().join(" ");
    TokenizeResult { main_text: collapsed, tokens, attributes }
}

/// Emits `current` as a token at `depth`, decoding a `key:value`/`key=value`
/// fragment into an attribute when `depth >= 1`, and resets `current`.
fn flush_token(
    depth: usize,
    current: &mut String,
    tokens: &mut Vec<DepthToken>,
    attributes: &mut Vec<ExtractedAttribute>,
    main_text: &mut String,
) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        if depth >= 1 {
            if let Some(attribute) = decode_key_value(trimmed) {
                attributes.push(attribute);
            }
        } else {
            main_text.push(' ');
            main_text.push_str(trimmed);
        }
        tokens.push(DepthToken { depth, text: trimmed.to_string() });
    }
    current.clear();
}

/// Decodes a `key:value` or `key=value` fragment into a
/// [`ItemAttributeType::TextValue`] attribute.
fn decode_key_value(fragment: &str) -> Option<ExtractedAttribute> {
    let (key, value) = fragment.split_once(':').or_else(|| fragment.split_once('='))?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some(ExtractedAttribute {
        attribute_type: ItemAttributeType::TextValue,
        attribute_name: key.to_lowercase(),
        attribute_value: value.to_string(),
        unit: None,
        original_text: fragment.to_string(),
        confidence: 0.9,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_main_text_from_bracketed_fragment() {
        let result = tokenize("Розетка (IP44)");
        assert_eq!(result.main_text, "Розетка");
        assert!(result.tokens.iter().any(|t| t.depth == 1 && t.text == "IP44"));
    }

    #[test]
    fn decodes_key_value_fragment_inside_brackets() {
        let result = tokenize("Розетка (цвет:белый, IP44)");
        assert_eq!(result.main_text, "Розетка");
        assert!(result.attributes.iter().any(|a| a.attribute_name == "цвет" && a.attribute_value == "белый"));
    }

    #[test]
    fn nested_parens_increase_depth() {
        let result = tokenize("A (B (C))");
        let max_depth = result.tokens.iter().map(|t| t.depth).max().unwrap_or(0);
        assert_eq!(max_depth, 2);
    }

    #[test]
    fn plain_text_without_brackets_is_unaffected() {
        let result = tokenize("Простое название");
        assert_eq!(result.main_text, "Простое название");
        assert!(result.attributes.is_empty());
    }
}
