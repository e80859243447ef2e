// crates/catalog-core/src/domain/classifier.rs
// ============================================================================
// Module: Classifier Tree
// Description: The industry-classifier (IC) tree node (spec §3).
// Purpose: Model the read-only forest the hierarchical classifier walks.
// Dependencies: serde, crate::identifiers
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::IcCode;

/// One node of the IC tree, loaded read-only from an authoritative file.
///
/// # Invariants
/// - `level >= 1`.
/// - If `parent_code` is `Some`, a node with that code exists and its
///   `level` is `self.level - 1` (spec §3).
/// - Forms a rooted forest: level-1 nodes have no parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierNode {
    /// This node's IC code.
    pub code: IcCode,
    /// Human-readable name.
    pub name: String,
    /// Parent node's code, or `None` at the forest root.
    pub parent_code: Option<IcCode>,
    /// Depth in the tree, starting at 1.
    pub level: u32,
}

impl ClassifierNode {
    /// Returns whether this node is a root of the forest.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_code.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_node_has_no_parent() {
        let root = ClassifierNode { code: IcCode::new("A"), name: "A".into(), parent_code: None, level: 1 };
        assert!(root.is_root());
    }

    #[test]
    fn child_node_has_parent() {
        let child = ClassifierNode {
            code: IcCode::new("A1"),
            name: "A1".into(),
            parent_code: Some(IcCode::new("A")),
            level: 2,
        };
        assert!(!child.is_root());
    }
}
