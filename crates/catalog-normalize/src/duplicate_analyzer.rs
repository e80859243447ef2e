// crates/catalog-normalize/src/duplicate_analyzer.rs
// ============================================================================
// Module: Duplicate Analyzer (DA)
// Description: Finds near-duplicate normalized groups that NN's exact
// `(category, normalized_name)` grouping did not collapse, and picks a
// master record per resulting group (spec §4.9).
// Purpose: Catch duplicates NN's deterministic pipeline structurally cannot
// — two different normalized names describing the same product — using
// semantic/phonetic/word-based similarity, then rank candidates so callers
// know which row to treat as canonical.
// Dependencies: catalog-core, catalog-config, strsim
// ============================================================================

//! ## Overview
//! Four independent detectors each propose duplicate pairs (spec §4.9):
//! - **Exact** — case-insensitive equality of `normalized_name` (catches
//!   groups NN produced under different `category` guesses for the same
//!   text).
//! - **Semantic** — TF-IDF cosine similarity over whitespace tokens.
//! - **Phonetic** — Levenshtein similarity over a phonetic fold (vowel
//!   stripping), catching transliteration/misspelling drift.
//! - **Word-based** — shared-token count after optional stop-word removal.
//!
//! Pairs are unioned into groups; a group touched by more than one detector
//! is reclassified as [`DuplicateType::Mixed`] (spec §4.9 "overlapping
//! groups merge"). Each group's master is the member maximizing
//! [`NormalizedData::partial_master_score`].

use std::collections::HashMap;
use std::collections::HashSet;

use catalog_config::DuplicateAnalysisConfig;
use catalog_core::domain::DuplicateType;
use catalog_core::domain::NormalizedData;
use catalog_core::identifiers::NormalizedDataId;

/// A cluster of rows judged to describe the same underlying item.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Reason the members were grouped together.
    pub duplicate_type: DuplicateType,
    /// Every member's row id, master included.
    pub members: Vec<NormalizedDataId>,
    /// The member selected as canonical (spec §4.9 master-selection score).
    pub master_id: NormalizedDataId,
}

/// Quality weight fed into [`NormalizedData::partial_master_score`] for each
/// detection method; exact/mixed matches carry the highest confidence that
/// the grouping is correct (spec §4.9).
fn detector_quality(duplicate_type: DuplicateType) -> f64 {
    match duplicate_type {
        DuplicateType::Exact | DuplicateType::Mixed => 1.0,
        DuplicateType::Semantic => 0.9,
        DuplicateType::Phonetic => 0.8,
        DuplicateType::WordBased => 0.7,
    }
}

const STOP_WORDS: &[&str] = &["и", "для", "с", "в", "на", "the", "a", "an", "of", "for", "and"];

/// Finds duplicate groups among `rows` (spec §4.9).
///
/// # Invariants
/// - Every input row appears in at most one output group; rows with no
///   detected duplicate are simply absent from the result, not emitted as
///   singleton groups.
#[must_use]
pub fn find_duplicates(rows: &[NormalizedData], config: &DuplicateAnalysisConfig) -> Vec<DuplicateGroup> {
    if rows.len() < 2 {
        return Vec::new();
    }

    let mut union_find = UnionFind::new(rows.len());
    let mut pair_types: HashMap<(usize, usize), HashSet<DuplicateType>> = HashMap::new();
    let tf_idf_vectors = tf_idf_vectors(rows);

    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            let mut matched = Vec::new();

            if rows[i].normalized_name.eq_ignore_ascii_case(&rows[j].normalized_name) {
                matched.push(DuplicateType::Exact);
            }
            if cosine_similarity(&tf_idf_vectors[i], &tf_idf_vectors[j]) >= config.semantic_threshold {
                matched.push(DuplicateType::Semantic);
            }
            if phonetic_similarity(&rows[i].normalized_name, &rows[j].normalized_name) >= config.phonetic_threshold {
                matched.push(DuplicateType::Phonetic);
            }
            if shared_word_count(&rows[i].normalized_name, &rows[j].normalized_name, config.remove_stop_words)
                >= u64::from(config.min_common_words)
            {
                matched.push(DuplicateType::WordBased);
            }

            if !matched.is_empty() {
                union_find.union(i, j);
                pair_types.entry(pair_key(i, j)).or_default().extend(matched);
            }
        }
    }

    build_groups(rows, &mut union_find, &pair_types)
}

/// Key used to look up which detectors matched a given pair, independent of
/// argument order.
fn pair_key(i: usize, j: usize) -> (usize, usize) {
    if i < j { (i, j) } else { (j, i) }
}

/// Collapses union-find components into [`DuplicateGroup`]s, assigning each
/// a [`DuplicateType`] (the sole contributing type, or [`DuplicateType::Mixed`]
/// when a component was reached via more than one detector anywhere within
/// it) and a master selected by score.
fn build_groups(
    rows: &[NormalizedData],
    union_find: &mut UnionFind,
    pair_types: &HashMap<(usize, usize), HashSet<DuplicateType>>,
) -> Vec<DuplicateGroup> {
    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for index in 0..rows.len() {
        components.entry(union_find.find(index)).or_default().push(index);
    }

    let mut groups = Vec::new();
    for members in components.values() {
        if members.len() < 2 {
            continue;
        }
        let mut types_seen: HashSet<DuplicateType> = HashSet::new();
        for (a_pos, &a) in members.iter().enumerate() {
            for &b in &members[a_pos + 1..] {
                if let Some(types) = pair_types.get(&pair_key(a, b)) {
                    types_seen.extend(types.iter().copied());
                }
            }
        }
        let duplicate_type = if types_seen.len() > 1 { DuplicateType::Mixed } else {
            types_seen.into_iter().next().unwrap_or(DuplicateType::WordBased)
        };
        let quality = detector_quality(duplicate_type);
        let master_index = members
            .iter()
            .copied()
            .max_by(|&a, &b| {
                rows[a]
                    .partial_master_score(quality)
                    .partial_cmp(&rows[b].partial_master_score(quality))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(members[0]);

        groups.push(DuplicateGroup {
            duplicate_type,
            members: members.iter().map(|&index| rows[index].id).collect(),
            master_id: rows[master_index].id,
        });
    }
    groups
}

/// Splits `name` into lowercase whitespace tokens, optionally dropping
/// [`STOP_WORDS`].
fn tokenize(name: &str, remove_stop_words: bool) -> Vec<String> {
    name.to_lowercase()
        .split_whitespace()
        .filter(|token| !remove_stop_words || !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Builds a TF-IDF vector per row over the whole corpus's vocabulary (spec
/// §4.9 "semantic" detector).
fn tf_idf_vectors(rows: &[NormalizedData]) -> Vec<HashMap<String, f64>> {
    let documents: Vec<Vec<String>> = rows.iter().map(|row| tokenize(&row.normalized_name, false)).collect();
    let doc_count = documents.len().max(1) as f64;

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for document in &documents {
        let unique: HashSet<&str> = document.iter().map(String::as_str).collect();
        for token in unique {
            *document_frequency.entry(token).or_insert(0) += 1;
        }
    }

    documents
        .iter()
        .map(|document| {
            let mut term_frequency: HashMap<String, f64> = HashMap::new();
            for token in document {
                *term_frequency.entry(token.clone()).or_insert(0.0) += 1.0;
            }
            let length = document.len().max(1) as f64;
            term_frequency
                .into_iter()
                .map(|(token, count)| {
                    let tf = count / length;
                    let df = document_frequency.get(token.as_str()).copied().unwrap_or(1) as f64;
                    let idf = (doc_count / df).ln() + 1.0;
                    (token, tf * idf)
                })
                .collect()
        })
        .collect()
}

/// Cosine similarity between two sparse TF-IDF vectors.
fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = smaller.iter().filter_map(|(token, weight)| larger.get(token).map(|other| weight * other)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}

/// Folds a name to a coarse phonetic representation: lowercase, vowels
/// collapsed out (keeping the first letter of the string as an anchor),
/// repeated letters collapsed (spec §4.9 "phonetic hash").
fn phonetic_fold(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    let mut previous: Option<char> = None;
    for (index, ch) in lowered.chars().filter(|c| c.is_alphanumeric()).enumerate() {
        let is_vowel = "aeiouyауоыиэяюёе".contains(ch);
        if is_vowel && index > 0 {
            continue;
        }
        if previous == Some(ch) {
            continue;
        }
        folded.push(ch);
        previous = Some(ch);
    }
    folded
}

/// Phonetic similarity via normalized Levenshtein distance over folded forms
/// (spec §4.9 "phonetic" detector).
fn phonetic_similarity(a: &str, b: &str) -> f64 {
    let folded_a = phonetic_fold(a);
    let folded_b = phonetic_fold(b);
    if folded_a.is_empty() && folded_b.is_empty() { 1.0 } else { strsim::normalized_levenshtein(&folded_a, &folded_b) }
}

/// Shared whitespace-token count between two names (spec §4.9 "word-based"
/// detector).
fn shared_word_count(a: &str, b: &str, remove_stop_words: bool) -> u64 {
    let tokens_a: HashSet<String> = tokenize(a, remove_stop_words).into_iter().collect();
    let tokens_b: HashSet<String> = tokenize(b, remove_stop_words).into_iter().collect();
    tokens_a.intersection(&tokens_b).count() as u64
}

/// Minimal union-find over row indices, used to merge overlapping pairwise
/// matches into connected components (spec §4.9 "overlapping groups
/// merge").
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self { parent: (0..size).collect() }
    }

    fn find(&mut self, index: usize) -> usize {
        if self.parent[index] != index {
            self.parent[index] = self.find(self.parent[index]);
        }
        self.parent[index]
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_a] = root_b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::domain::ProcessingLevel;
    use catalog_core::time::Timestamp;

    fn row(id: i64, normalized_name: &str, merged_count: u64) -> NormalizedData {
        NormalizedData {
            id: NormalizedDataId(id),
            source_reference: format!("ref-{id}"),
            source_name: normalized_name.to_string(),
            code: format!("code-{id}"),
            normalized_name: normalized_name.to_string(),
            normalized_reference: format!("group-{id}"),
            category: "tools".to_string(),
            merged_count,
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

    #[test]
    fn exact_case_insensitive_duplicates_are_grouped() {
        let rows = [row(1, "молоток слесарный", 1), row(2, "МОЛОТОК СЛЕСАРНЫЙ", 1)];
        let groups = find_duplicates(&rows, &DuplicateAnalysisConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].duplicate_type, DuplicateType::Exact);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn unrelated_rows_produce_no_groups() {
        let rows = [row(1, "молоток слесарный", 1), row(2, "кабель медный", 1)];
        let groups = find_duplicates(&rows, &DuplicateAnalysisConfig::default());
        assert!(groups.is_empty());
    }

    #[test]
    fn word_based_detector_groups_shared_tokens() {
        let rows = [row(1, "молоток слесарный стальной", 1), row(2, "молоток слесарный пластиковый", 1)];
        let config = DuplicateAnalysisConfig { min_common_words: 2, semantic_threshold: 1.1, phonetic_threshold: 1.1, ..DuplicateAnalysisConfig::default() };
        let groups = find_duplicates(&rows, &config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].duplicate_type, DuplicateType::WordBased);
    }

    #[test]
    fn master_selection_prefers_higher_merged_count() {
        let rows = [row(1, "молоток слесарный", 1), row(2, "молоток слесарный", 9)];
        let groups = find_duplicates(&rows, &DuplicateAnalysisConfig::default());
        assert_eq!(groups[0].master_id, NormalizedDataId(2));
    }

    #[test]
    fn group_touched_by_multiple_detectors_is_mixed() {
        let rows = [row(1, "молоток слесарный", 1), row(2, "молоток слесарный", 1)];
        let groups = find_duplicates(&rows, &DuplicateAnalysisConfig::default());
        assert_eq!(groups[0].duplicate_type, DuplicateType::Mixed);
    }

    #[test]
    fn single_row_has_no_duplicates() {
        let rows = [row(1, "молоток", 1)];
        assert!(find_duplicates(&rows, &DuplicateAnalysisConfig::default()).is_empty());
    }
}
