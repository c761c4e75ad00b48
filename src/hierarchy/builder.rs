//! Building hierarchies from topic paths and normalizing user-supplied trees.

use serde::Deserialize;
use std::collections::HashMap;

use super::node::{TopicHierarchy, TopicHierarchyNode};

#[derive(Debug, Default)]
struct TrieNode {
    name: String,
    children: Vec<TrieNode>,
}

impl TrieNode {
    fn insert(children: &mut Vec<TrieNode>, segments: &[String]) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        let idx = match children.iter().position(|c| &c.name == head) {
            Some(idx) => idx,
            None => {
                children.push(TrieNode {
                    name: head.clone(),
                    children: Vec::new(),
                });
                children.len() - 1
            }
        };
        Self::insert(&mut children[idx].children, rest);
    }

    fn into_nodes(trie: Vec<TrieNode>, parent_id: Option<&str>) -> Vec<TopicHierarchyNode> {
        trie.into_iter()
            .map(|node| {
                let id = match parent_id {
                    Some(parent) => format!("{}/{}", parent, node.name),
                    None => node.name.clone(),
                };
                let children = Self::into_nodes(node.children, Some(&id));
                TopicHierarchyNode {
                    id,
                    name: node.name,
                    children,
                }
            })
            .collect()
    }
}

/// Builds a topic tree from flat root-to-leaf paths.
///
/// Each distinct segment at a given position becomes one node; a node is a
/// leaf iff no path extends past it. Segments are trimmed and blank segments
/// are skipped. Sibling order follows first appearance.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    roots: Vec<TrieNode>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one root-to-leaf path.
    pub fn add_path<S: AsRef<str>>(&mut self, path: &[S]) -> &mut Self {
        let segments: Vec<String> = path
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        TrieNode::insert(&mut self.roots, &segments);
        self
    }

    pub fn build(self) -> TopicHierarchy {
        TopicHierarchy::from_nodes(TrieNode::into_nodes(self.roots, None))
    }

    /// Convenience wrapper building straight from a path list.
    pub fn from_paths<S: AsRef<str>>(paths: &[Vec<S>]) -> TopicHierarchy {
        let mut builder = Self::new();
        for path in paths {
            builder.add_path(path);
        }
        builder.build()
    }
}

/// A loosely shaped topic node as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopicNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<RawTopicNode>>,
}

impl RawTopicNode {
    fn display_name(&self) -> Option<String> {
        [&self.name, &self.label, &self.title]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Normalize a caller-supplied tree.
///
/// Names come from `name`, then `label`, then `title`; nameless nodes are
/// dropped with their subtree. Missing ids default to the parent id joined
/// with the name, duplicate sibling ids get a `-N` suffix and empty child
/// lists collapse to a leaf.
pub fn normalize_hierarchy(raw: &[RawTopicNode]) -> TopicHierarchy {
    TopicHierarchy::from_nodes(normalize_level(raw, None))
}

fn normalize_level(raw: &[RawTopicNode], parent_id: Option<&str>) -> Vec<TopicHierarchyNode> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut nodes = Vec::with_capacity(raw.len());

    for node in raw {
        let Some(name) = node.display_name() else {
            continue;
        };

        let base_id = node
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match parent_id {
                Some(parent) => format!("{}/{}", parent, name),
                None => name.clone(),
            });

        let occurrences = seen.entry(base_id.clone()).or_insert(0);
        let id = if *occurrences == 0 {
            base_id
        } else {
            format!("{}-{}", base_id, occurrences)
        };
        *occurrences += 1;

        let children = node
            .children
            .as_deref()
            .map(|children| normalize_level(children, Some(&id)))
            .unwrap_or_default();

        nodes.push(TopicHierarchyNode { id, name, children });
    }

    nodes
}
