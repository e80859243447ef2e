// crates/catalog-classify/src/tree.rs
// ============================================================================
// Module: Classifier Tree Index
// Description: Read-only in-memory index over the IC forest (spec §3, §4.10).
// Purpose: Give the descent algorithm O(1) "children of this node" lookups
// instead of scanning the flat node list at every step.
// Dependencies: catalog-core
// ============================================================================

use std::collections::HashMap;

use catalog_core::domain::ClassifierNode;
use catalog_core::identifiers::IcCode;

/// Indexed view over the IC tree, built once per classifier run (spec §4.10
/// "IC tree loaded and non-empty" precondition).
///
/// # Invariants
/// - Built from [`ClassifierNode::is_root`]/`parent_code` alone; does not
///   re-validate the forest invariants the store already guarantees on load.
pub struct ClassifierTree {
    by_parent: HashMap<Option<IcCode>, Vec<ClassifierNode>>,
}

impl ClassifierTree {
    /// Indexes `nodes` by parent code, including the root set under `None`.
    #[must_use]
    pub fn build(nodes: Vec<ClassifierNode>) -> Self {
        let mut by_parent: HashMap<Option<IcCode>, Vec<ClassifierNode>> = HashMap::new();
        for node in nodes {
            by_parent.entry(node.parent_code.clone()).or_default().push(node);
        }
        Self { by_parent }
    }

    /// Returns whether the tree has no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_parent.values().all(Vec::is_empty)
    }

    /// Returns the level-1 root nodes (spec §4.10 step 1 "start at root set").
    #[must_use]
    pub fn roots(&self) -> &[ClassifierNode] {
        self.by_parent.get(&None).map_or(&[], Vec::as_slice)
    }

    /// Returns the children of `parent`, or the root set if `parent` is
    /// `None` (spec §4.10 step 2 "enumerate children of the current node (or
    /// root set on first iteration)").
    #[must_use]
    pub fn children_of(&self, parent: Option<&IcCode>) -> &[ClassifierNode] {
        self.by_parent.get(&parent.cloned()).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(code: &str, parent: Option<&str>, level: u32) -> ClassifierNode {
        ClassifierNode { code: IcCode::new(code), name: code.to_string(), parent_code: parent.map(IcCode::new), level }
    }

    #[test]
    fn roots_are_nodes_with_no_parent() {
        let tree = ClassifierTree::build(vec![node("A", None, 1), node("A1", Some("A"), 2)]);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.roots()[0].code.as_str(), "A");
    }

    #[test]
    fn children_of_looks_up_by_parent_code() {
        let tree = ClassifierTree::build(vec![
            node("A", None, 1),
            node("A1", Some("A"), 2),
            node("A2", Some("A"), 2),
            node("A1a", Some("A1"), 3),
        ]);
        let children = tree.children_of(Some(&IcCode::new("A")));
        assert_eq!(children.len(), 2);
        assert!(tree.children_of(Some(&IcCode::new("A1a"))).is_empty());
    }

    #[test]
    fn empty_tree_reports_empty() {
        assert!(ClassifierTree::build(Vec::new()).is_empty());
    }
}
