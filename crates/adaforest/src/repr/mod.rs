//! Tree and forest representations.
//!
//! Trees are arenas of [`Node`]s with per-leaf class statistics; a
//! [`Forest`] is an ordered list of trees voting over a shared vocabulary.

/// Node identifier: an index into the tree's node arena.
pub type NodeId = u32;

pub mod distribution;
pub mod forest;
pub mod node;
pub mod tree;

pub use distribution::{
    majority_and_confidence, merge_counts, merge_distributions, merge_vocabulary, ClassDistribution,
    DistributionSummary, Majority, VocabularyMerge,
};
pub use forest::{Forest, ForestValidationError};
pub use node::{Leaf, Node, NodeKind, SplitAttribute, SplitCondition, SplitOp, Threshold};
pub use tree::{GraftSide, RouteError, RoutedBatch, Tree, TreeBuilder, TreeValidationError};
