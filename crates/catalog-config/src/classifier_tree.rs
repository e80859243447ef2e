// crates/catalog-config/src/classifier_tree.rs
// ============================================================================
// Module: Classifier Tree File Loader
// Description: Parses the authoritative IC tree text file into
// `ClassifierNode` rows (spec §3 "pre-loaded from an authoritative text
// file; read-only at runtime").
// Purpose: Give the operator CLI a deterministic, human-editable source
// format for seeding/refreshing the service store's classifier tree without
// inventing a bespoke binary format.
// Dependencies: catalog-core
// ============================================================================

//! ## Overview
//! The file is a tab-separated values document, one node per line:
//! `code\tname\tparent_code\tlevel`. The root of a branch leaves
//! `parent_code` empty. Blank lines and lines starting with `#` are ignored.
//! Parsing is separated from validation: every line is parsed first, then
//! checked for structural consistency, before any node is handed to a store.

use std::path::Path;

use catalog_core::domain::ClassifierNode;
use catalog_core::identifiers::IcCode;

use crate::error::ConfigError;

/// Parses a classifier tree file at `path` into its nodes.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read, or
/// [`ConfigError::Invalid`] if a line is malformed or a child node's level
/// does not follow its parent's.
pub fn load_classifier_tree_file(path: &Path) -> Result<Vec<ClassifierNode>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    parse_classifier_tree(&contents)
}

/// Parses classifier tree TSV contents into nodes, validating level
/// continuity against already-parsed parents.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if a line is malformed, a level is not a
/// positive integer, or a child's level does not equal its parent's level
/// plus one.
pub fn parse_classifier_tree(contents: &str) -> Result<Vec<ClassifierNode>, ConfigError> {
    let mut nodes = Vec::new();
    let mut levels_by_code = std::collections::HashMap::new();

    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let [code, name, parent_code, level] = fields.as_slice() else {
            return Err(ConfigError::Invalid(format!("classifier tree line {}: expected 4 tab-separated fields, got {}", line_number + 1, fields.len())));
        };
        let level: u32 = level.trim().parse().map_err(|_| ConfigError::Invalid(format!("classifier tree line {}: level {level:?} is not a positive integer", line_number + 1)))?;
        if level == 0 {
            return Err(ConfigError::Invalid(format!("classifier tree line {}: level must be >= 1", line_number + 1)));
        }
        let parent_code = parent_code.trim();
        let parent_code = if parent_code.is_empty() { None } else { Some(IcCode::new(parent_code)) };

        if let Some(parent) = &parent_code {
            let parent_level = levels_by_code.get(parent.as_str()).copied();
            if parent_level != Some(level - 1) {
                return Err(ConfigError::Invalid(format!("classifier tree line {}: parent {parent} must be at level {} before code {code}", line_number + 1, level - 1)));
            }
        } else if level != 1 {
            return Err(ConfigError::Invalid(format!("classifier tree line {}: root node {code} must have level 1", line_number + 1)));
        }

        let code = code.trim();
        levels_by_code.insert(code.to_string(), level);
        nodes.push(ClassifierNode { code: IcCode::new(code), name: (*name).to_string(), parent_code, level });
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_level_tree() {
        let contents = "A\tRoot A\t\t1\nA1\tChild of A\tA\t2\n";
        let nodes = parse_classifier_tree(contents).expect("valid tree");
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_root());
        assert_eq!(nodes[1].parent_code, Some(IcCode::new("A")));
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        let contents = "# header\n\nA\tRoot A\t\t1\n";
        let nodes = parse_classifier_tree(contents).expect("valid tree");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn rejects_a_child_before_its_parent() {
        let contents = "A1\tChild\tA\t2\nA\tRoot\t\t1\n";
        let err = parse_classifier_tree(contents).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_root_level_without_parent() {
        let contents = "A\tRoot\t\t2\n";
        let err = parse_classifier_tree(contents).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_line() {
        let contents = "A\tRoot A\t1\n";
        let err = parse_classifier_tree(contents).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
