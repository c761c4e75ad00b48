//! Topic hierarchy model and builder.
//!
//! Topic paths produced by an external classification step are folded into a
//! tree of [`TopicHierarchyNode`]s. Coverage is measured over the leaves.

pub mod builder;
pub mod node;

pub use builder::{normalize_hierarchy, HierarchyBuilder, RawTopicNode};
pub use node::{depth, leaf_count, leaf_names, TopicHierarchy, TopicHierarchyNode};
