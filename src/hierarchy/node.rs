//! Topic hierarchy tree types and structural measures.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::EngineError;

/// A node in a dataset's topic hierarchy.
///
/// A node is a leaf iff it has no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHierarchyNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TopicHierarchyNode>,
}

impl TopicHierarchyNode {
    /// Create a leaf node.
    pub fn leaf(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Attach children to this node.
    pub fn with_children(mut self, children: Vec<TopicHierarchyNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Count nodes with no children, recursively.
pub fn leaf_count(nodes: &[TopicHierarchyNode]) -> usize {
    nodes
        .iter()
        .map(|node| {
            if node.is_leaf() {
                1
            } else {
                leaf_count(&node.children)
            }
        })
        .sum()
}

/// Number of levels in the hierarchy; 0 when empty, 1 for a flat list.
pub fn depth(nodes: &[TopicHierarchyNode]) -> usize {
    nodes
        .iter()
        .map(|node| 1 + depth(&node.children))
        .max()
        .unwrap_or(0)
}

/// Leaf topic names in depth-first order.
pub fn leaf_names(nodes: &[TopicHierarchyNode]) -> Vec<String> {
    fn collect(nodes: &[TopicHierarchyNode], out: &mut Vec<String>) {
        for node in nodes {
            if node.is_leaf() {
                out.push(node.name.clone());
            } else {
                collect(&node.children, out);
            }
        }
    }

    let mut names = Vec::new();
    collect(nodes, &mut names);
    names
}

/// A topic hierarchy together with its derived measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHierarchy {
    pub nodes: Vec<TopicHierarchyNode>,
    pub leaf_count: usize,
    pub depth: usize,
}

impl TopicHierarchy {
    /// Wrap a node list, computing leaf count and depth.
    pub fn from_nodes(nodes: Vec<TopicHierarchyNode>) -> Self {
        let leaf_count = leaf_count(&nodes);
        let depth = depth(&nodes);
        Self {
            nodes,
            leaf_count,
            depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    pub fn leaf_names(&self) -> Vec<String> {
        leaf_names(&self.nodes)
    }

    /// Reject hierarchies that carry no topics.
    pub fn ensure_non_empty(&self) -> Result<(), EngineError> {
        if self.is_empty() {
            return Err(EngineError::Domain(
                "Hierarchy must have at least one topic".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject empty hierarchies and leaves that share a name.
    ///
    /// Records reference topics by leaf name, so two leaves called `Other`
    /// under different parents could not be told apart.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.ensure_non_empty()?;
        let mut seen = HashSet::new();
        let mut duplicates: Vec<String> = Vec::new();
        for name in self.leaf_names() {
            if !seen.insert(name.clone()) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
        if !duplicates.is_empty() {
            return Err(EngineError::Domain(format!(
                "Leaf topic names must be unique; duplicated: {}",
                duplicates.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<TopicHierarchyNode> {
        vec![
            TopicHierarchyNode::leaf("billing", "billing").with_children(vec![
                TopicHierarchyNode::leaf("billing/refunds", "refunds"),
                TopicHierarchyNode::leaf("billing/invoices", "invoices").with_children(vec![
                    TopicHierarchyNode::leaf("billing/invoices/pdf", "pdf"),
                ]),
            ]),
            TopicHierarchyNode::leaf("shipping", "shipping"),
        ]
    }

    #[test]
    fn test_leaf_count_counts_childless_nodes() {
        assert_eq!(leaf_count(&sample_tree()), 3);
        assert_eq!(leaf_count(&[]), 0);
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth(&sample_tree()), 3);
        assert_eq!(depth(&[TopicHierarchyNode::leaf("a", "a")]), 1);
        assert_eq!(depth(&[]), 0);
    }

    #[test]
    fn test_leaf_names_depth_first() {
        assert_eq!(leaf_names(&sample_tree()), vec!["refunds", "pdf", "shipping"]);
    }

    #[test]
    fn test_empty_hierarchy_rejected() {
        let hierarchy = TopicHierarchy::from_nodes(Vec::new());
        let err = hierarchy.ensure_non_empty().expect_err("empty must fail");
        assert_eq!(err.to_string(), "Hierarchy must have at least one topic");
    }

    #[test]
    fn test_duplicate_leaf_names_rejected() {
        let hierarchy = TopicHierarchy::from_nodes(vec![
            TopicHierarchyNode::leaf("billing", "Billing")
                .with_children(vec![TopicHierarchyNode::leaf("billing/other", "Other")]),
            TopicHierarchyNode::leaf("shipping", "Shipping")
                .with_children(vec![TopicHierarchyNode::leaf("shipping/other", "Other")]),
            TopicHierarchyNode::leaf("returns", "Returns"),
        ]);
        assert_eq!(hierarchy.leaf_count, 3);
        assert_eq!(hierarchy.leaf_names(), vec!["Other", "Other", "Returns"]);

        let err = hierarchy.validate().expect_err("shared leaf name must fail");
        assert!(matches!(err, EngineError::Domain(ref m) if m.contains("Other")));
        assert!(TopicHierarchy::from_nodes(sample_tree()).validate().is_ok());
    }

    #[test]
    fn test_children_omitted_when_empty() {
        let json = serde_json::to_value(TopicHierarchyNode::leaf("a", "a")).expect("serialize");
        assert!(json.get("children").is_none());
        let parsed: TopicHierarchyNode =
            serde_json::from_str(r#"{"id":"a","name":"a"}"#).expect("deserialize");
        assert!(parsed.is_leaf());
    }
}
