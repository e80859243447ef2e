// crates/catalog-core/src/domain/normalized.rs
// ============================================================================
// Module: Normalized Data
// Description: Output rows of the normalization engine and the attributes
// extracted from source names (spec §3).
// Purpose: Carry the processing-level provenance and IC classification
// fields the rest of the pipeline (DA, HC) reads and writes.
// Dependencies: serde, crate::identifiers, crate::time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::IcCode;
use crate::identifiers::ItemAttributeId;
use crate::identifiers::NormalizedDataId;
use crate::identifiers::ProjectDatabaseId;
use crate::time::Timestamp;

/// Provenance of a normalized row (GLOSSARY).
///
/// # Invariants
/// - `Basic` means rule-based output was kept as-is.
/// - `AiEnhanced` means AI output replaced rule output above the configured
///   confidence floor.
/// - `Benchmark` means a curated client benchmark match was used instead of
///   running NN/AIN at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLevel {
    /// Rule-based normalizer output, unmodified.
    Basic,
    /// AI output replaced rule-based output.
    AiEnhanced,
    /// Taken from a curated client benchmark entry.
    Benchmark,
}

impl ProcessingLevel {
    /// Returns the master-selection score bonus for this level (spec §4.9).
    #[must_use]
    pub const fn master_score_bonus(self) -> f64 {
        match self {
            Self::Benchmark => 30.0,
            Self::AiEnhanced => 20.0,
            Self::Basic => 0.0,
        }
    }
}

/// One normalized-group output row.
///
/// # Invariants
/// - For every `(normalized_name, category)` group, all rows share the same
///   `normalized_reference` and `merged_count` equal to the group size
///   (spec §8.1).
/// - `ic_code`/`ic_name`/`ic_confidence` are all `Some` or all `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedData {
    /// Row identifier.
    pub id: NormalizedDataId,
    /// Source-system reference this row was produced from.
    pub source_reference: String,
    /// Original source name before normalization.
    pub source_name: String,
    /// Source-system code.
    pub code: String,
    /// Normalized (cleaned) name.
    pub normalized_name: String,
    /// Shared reference minted once per `(category, normalized_name)` group.
    pub normalized_reference: String,
    /// Assigned category.
    pub category: String,
    /// Number of source rows folded into this group.
    pub merged_count: u64,
    /// AI confidence, if AI was consulted.
    pub ai_confidence: Option<f64>,
    /// AI reasoning text, if AI was consulted.
    pub ai_reasoning: Option<String>,
    /// Provenance of this row's category/name.
    pub processing_level: ProcessingLevel,
    /// Assigned IC code, if classified.
    pub ic_code: Option<IcCode>,
    /// Assigned IC name, if classified.
    pub ic_name: Option<String>,
    /// IC classification confidence, if classified.
    pub ic_confidence: Option<f64>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Source database this row was produced from, if known.
    pub source_database_id: Option<ProjectDatabaseId>,
    /// Source iteration number, if known.
    pub source_iteration_number: Option<u32>,
}

impl NormalizedData {
    /// Returns whether this row still needs IC classification.
    #[must_use]
    pub const fn needs_ic_classification(&self) -> bool {
        self.ic_code.is_none()
    }

    /// Returns the quality score used for master selection in DA (spec
    /// §4.9): `40*quality + 10*merged_count + level_bonus + min(len/2, 10)`.
    /// `quality` here is the caller-supplied base quality score (e.g. from a
    /// [`crate::domain::DuplicateType`]-aware scorer); this helper only folds
    /// in the parts this type knows about.
    #[must_use]
    pub fn partial_master_score(&self, quality: f64) -> f64 {
        let len_component = (self.normalized_name.len() as f64 / 2.0).min(10.0);
        40.0 * quality
            + 10.0 * self.merged_count as f64
            + self.processing_level.master_score_bonus()
            + len_component
    }
}

/// Kind of attribute extracted from a free-text name (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAttributeType {
    /// A free-text value (e.g. a color word).
    TextValue,
    /// A numeric measurement with an optional unit.
    NumericValue,
    /// A dimension pair/triple (e.g. `3x2.5`).
    Dimension,
    /// An article/SKU-style code.
    ArticleCode,
    /// A technical specification code.
    TechnicalCode,
}

/// An attribute extracted from a source name.
///
/// # Invariants
/// - `original_text` is always a substring of the name it was extracted from
///   (spec §8.5).
/// - `confidence` is in `[0, 1]`.
/// - Deleted iff its parent [`NormalizedData`] row is deleted (cascade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttribute {
    /// Row identifier.
    pub id: ItemAttributeId,
    /// Owning normalized row.
    pub normalized_item_id: NormalizedDataId,
    /// Attribute kind.
    pub attribute_type: ItemAttributeType,
    /// Canonical attribute name (e.g. `"weight"`, `"thickness"`).
    pub attribute_name: String,
    /// Extracted value, as text.
    pub attribute_value: String,
    /// Unit of measure, if applicable.
    pub unit: Option<String>,
    /// Exact substring of the source name this attribute was extracted from.
    pub original_text: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Duplicate-group classification reason (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateType {
    /// Case-insensitive equality on code or normalized name.
    Exact,
    /// TF-IDF cosine similarity above threshold.
    Semantic,
    /// Levenshtein distance over a phonetic hash above threshold.
    Phonetic,
    /// Shared-token count above threshold.
    WordBased,
    /// Two or more of the above agreed on overlapping members.
    Mixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_score_bonus_ranks_benchmark_highest() {
        assert!(
            ProcessingLevel::Benchmark.master_score_bonus()
                > ProcessingLevel::AiEnhanced.master_score_bonus()
        );
        assert!(
            ProcessingLevel::AiEnhanced.master_score_bonus()
                > ProcessingLevel::Basic.master_score_bonus()
        );
    }

    #[test]
    fn needs_ic_classification_reflects_missing_code() {
        let mut row = sample_row();
        assert!(row.needs_ic_classification());
        row.ic_code = Some(IcCode::new("28.29.11"));
        assert!(!row.needs_ic_classification());
    }

    fn sample_row() -> NormalizedData {
        NormalizedData {
            id: NormalizedDataId(1),
            source_reference: "r1".into(),
            source_name: "Молоток 500г".into(),
            code: "c1".into(),
            normalized_name: "молоток".into(),
            normalized_reference: "ref-1".into(),
            category: "tools".into(),
            merged_count: 1,
            ai_confidence: None,
            ai_reasoning: None,
            processing_level: ProcessingLevel::Basic,
            ic_code: None,
            ic_name: None,
            ic_confidence: None,
            created_at: Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").expect("valid"),
            source_database_id: None,
            source_iteration_number: None,
        }
    }
}
