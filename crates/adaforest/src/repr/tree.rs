//! Arena decision tree.
//!
//! All nodes of a [`Tree`] live in one `Vec<Node>` and reference each other by
//! [`NodeId`]. Structural edits (grafting a new root, replacing a leaf by a
//! subtree) append nodes and overwrite slots; [`Tree::rebuild_index`] then
//! compacts the arena in pre-order so that ids are again dense, the root is 0
//! and the leaf index, depths and node count are current.

use ndarray::Array2;
use tracing::trace;

use crate::data::{BatchStats, Record, Value};

use super::distribution::{merge_counts, merge_vocabulary};
use super::node::{Leaf, Node, NodeKind, SplitAttribute, SplitCondition, SplitOp};
use super::{ClassDistribution, NodeId};

static MISSING: Value = Value::Missing;

// ============================================================================
// Errors
// ============================================================================

/// Failure to route a record to a leaf.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("no child of node {node} matches `{attribute}` = {value}")]
    NoMatchingChild {
        node: NodeId,
        attribute: String,
        value: String,
    },
    #[error("forest has no trees")]
    NoTrees,
}

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("node {node} references child {child} outside an arena of {n_nodes} nodes")]
    ChildOutOfBounds {
        node: NodeId,
        child: NodeId,
        n_nodes: usize,
    },
    #[error("node {node} references itself as a child")]
    SelfLoop { node: NodeId },
    #[error("node {node} is reached by more than one path")]
    DuplicateVisit { node: NodeId },
    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },
    #[error("internal node {node} has {n_children} children, at least 2 required")]
    TooFewChildren { node: NodeId, n_children: usize },
    #[error("node {node} does not point back at its parent {parent}")]
    ParentMismatch { node: NodeId, parent: NodeId },
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },
    #[error("leaf {node} has {n_values} class values but {n_counts} counts")]
    DistributionMismatch {
        node: NodeId,
        n_values: usize,
        n_counts: usize,
    },
    #[error("leaf index holds {indexed} entries but {reachable} leaves are reachable")]
    LeafIndexOutOfSync { indexed: usize, reachable: usize },
    #[error("node {node} is not a leaf")]
    NotALeaf { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Side of a new root taken by the grafted branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraftSide {
    /// New branch on `<= threshold`, existing tree on `> threshold`.
    Below,
    /// Existing tree on `<= threshold`, new branch on `> threshold`.
    Above,
}

/// Class counts of a batch routed through a tree.
#[derive(Debug, Clone)]
pub struct RoutedBatch {
    /// `[n_leaves, n_classes]`, rows follow the leaf index.
    pub counts: Array2<u32>,
    /// Leaf position of each batch record, `None` when it could not be routed.
    pub assignments: Vec<Option<usize>>,
}

/// A decision tree with per-leaf class statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    leaves: Vec<NodeId>,
    n_nodes: usize,
    depth: u32,
    /// Tree-level class vocabulary and counts over all data seen.
    classes: ClassDistribution,
    /// Per-attribute range of all data the tree was trained or repaired on.
    range_min: Vec<f64>,
    range_max: Vec<f64>,
}

impl Tree {
    /// A tree made of one leaf.
    pub fn single_leaf(prediction: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::leaf(prediction)],
            root: 0,
            leaves: vec![0],
            n_nodes: 1,
            depth: 0,
            classes: ClassDistribution::default(),
            range_min: Vec::new(),
            range_max: Vec::new(),
        }
    }

    // --- accessors ---

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Leaf ids in pre-order.
    #[inline]
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.leaves.len()
    }

    /// Number of reachable nodes as of the last index rebuild.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn is_single_leaf(&self) -> bool {
        self.node(self.root).is_leaf()
    }

    pub fn leaf(&self, id: NodeId) -> Option<&Leaf> {
        self.nodes.get(id as usize).and_then(Node::as_leaf)
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut Leaf> {
        self.nodes.get_mut(id as usize).and_then(Node::as_leaf_mut)
    }

    /// Indexed leaves with their ids.
    pub fn iter_leaves(&self) -> impl Iterator<Item = (NodeId, &Leaf)> + '_ {
        self.leaves
            .iter()
            .filter_map(move |&id| self.leaf(id).map(|leaf| (id, leaf)))
    }

    #[inline]
    pub fn vocabulary(&self) -> &[String] {
        self.classes.values()
    }

    #[inline]
    pub fn class_distribution(&self) -> &ClassDistribution {
        &self.classes
    }

    #[inline]
    pub fn range_min(&self) -> &[f64] {
        &self.range_min
    }

    #[inline]
    pub fn range_max(&self) -> &[f64] {
        &self.range_max
    }

    // --- ranges ---

    /// Replace the tree range with the batch's range.
    pub fn set_range(&mut self, batch: &BatchStats) {
        self.range_min = batch.min().to_vec();
        self.range_max = batch.max().to_vec();
    }

    /// Widen the tree range to include the batch's range.
    pub fn extend_range(&mut self, batch: &BatchStats) {
        let n = batch.min().len();
        if self.range_min.len() < n {
            self.range_min.resize(n, f64::INFINITY);
            self.range_max.resize(n, f64::NEG_INFINITY);
        }
        for a in 0..n {
            self.range_min[a] = self.range_min[a].min(batch.min()[a]);
            self.range_max[a] = self.range_max[a].max(batch.max()[a]);
        }
    }

    // --- traversal ---

    /// Descend from the root to the leaf `record` belongs to.
    ///
    /// At each internal node the first child whose condition matches the
    /// record's value is taken.
    ///
    /// # Errors
    ///
    /// [`RouteError::NoMatchingChild`] when no child matches, e.g. an unseen
    /// category or a missing value.
    pub fn route_record(&self, record: &Record) -> Result<NodeId, RouteError> {
        let mut id = self.root;
        loop {
            let node = &self.nodes[id as usize];
            let NodeKind::Internal { attribute, children } = &node.kind else {
                return Ok(id);
            };
            let value = record.values().get(attribute.index).unwrap_or(&MISSING);
            let next = children.iter().copied().find(|&child| {
                self.nodes[child as usize]
                    .condition
                    .as_ref()
                    .is_some_and(|c| c.matches(value))
            });
            match next {
                Some(child) => id = child,
                None => {
                    return Err(RouteError::NoMatchingChild {
                        node: id,
                        attribute: attribute.name.clone(),
                        value: value.to_string(),
                    })
                }
            }
        }
    }

    /// Majority class of the leaf `record` is routed to.
    pub fn predict(&self, record: &Record) -> Result<&str, RouteError> {
        let id = self.route_record(record)?;
        Ok(self.leaf(id).map_or("", |leaf| leaf.prediction.as_str()))
    }

    /// Route every batch record and count classes per leaf over `vocabulary`.
    ///
    /// Records whose label is not in `vocabulary` are assigned but not counted.
    pub fn route_batch(&self, batch: &BatchStats, vocabulary: &[String]) -> RoutedBatch {
        let mut position = vec![usize::MAX; self.nodes.len()];
        for (p, &id) in self.leaves.iter().enumerate() {
            position[id as usize] = p;
        }

        let mut counts = Array2::<u32>::zeros((self.leaves.len(), vocabulary.len()));
        let mut assignments = Vec::with_capacity(batch.n_records());
        for record in batch.records() {
            let assignment = match self.route_record(record) {
                Ok(id) if position[id as usize] != usize::MAX => Some(position[id as usize]),
                Ok(id) => {
                    trace!(node = id, "record routed to an unindexed leaf");
                    None
                }
                Err(err) => {
                    trace!(%err, "record skipped");
                    None
                }
            };
            if let Some(p) = assignment {
                let class = batch
                    .label(record)
                    .and_then(|label| vocabulary.iter().position(|v| v == label));
                if let Some(c) = class {
                    counts[[p, c]] += 1;
                }
            }
            assignments.push(assignment);
        }
        RoutedBatch {
            counts,
            assignments,
        }
    }

    // --- leaf statistics ---

    /// Route the batch, retain its records in their leaves and refresh every
    /// leaf's distribution, prediction and confidence.
    ///
    /// With `first_batch` the routed counts replace each leaf's distribution;
    /// otherwise they are merged by class name into the prior one. The tree
    /// vocabulary grows to include the batch's class values either way.
    pub fn update_leaf_stats(&mut self, batch: &BatchStats, first_batch: bool) {
        let vocabulary = merge_vocabulary(self.classes.values(), batch.class_values()).merged;
        let class_counts = if first_batch {
            merge_counts(&vocabulary, &[], &[], batch.class_values(), batch.class_counts())
        } else {
            merge_counts(
                &vocabulary,
                self.classes.values(),
                self.classes.counts(),
                batch.class_values(),
                batch.class_counts(),
            )
        };
        self.classes = ClassDistribution::new(vocabulary.clone(), class_counts);
        self.apply_leaf_stats(batch, &vocabulary, first_batch);
    }

    /// First-batch statistics laid out over a fixed `vocabulary`.
    pub fn seed_leaf_stats(&mut self, batch: &BatchStats, vocabulary: &[String]) {
        let counts = merge_counts(vocabulary, &[], &[], batch.class_values(), batch.class_counts());
        self.classes = ClassDistribution::new(vocabulary.to_vec(), counts);
        self.apply_leaf_stats(batch, vocabulary, true);
    }

    fn apply_leaf_stats(&mut self, batch: &BatchStats, vocabulary: &[String], overwrite: bool) {
        let routed = self.route_batch(batch, vocabulary);

        for (record, assignment) in batch.records().iter().zip(&routed.assignments) {
            if let Some(p) = *assignment {
                let id = self.leaves[p];
                if let Some(leaf) = self.leaf_mut(id) {
                    leaf.records.push(record.clone());
                }
            }
        }

        for p in 0..self.leaves.len() {
            let id = self.leaves[p];
            let row = routed.counts.row(p).to_vec();
            let Some(leaf) = self.leaf_mut(id) else {
                continue;
            };
            let distribution = match (&leaf.distribution, overwrite) {
                (Some(prior), false) => prior.merged(vocabulary, vocabulary, &row),
                _ => ClassDistribution::new(vocabulary.to_vec(), row),
            };
            leaf.set_distribution(distribution);
        }
    }

    // --- structural edits ---

    /// Put a new root splitting `attribute` at `threshold` above the current
    /// root. `branch` takes the `side` of the split, the existing tree the
    /// other one. The index is rebuilt.
    pub fn graft_root(
        &mut self,
        attribute: SplitAttribute,
        threshold: f64,
        branch: Tree,
        side: GraftSide,
    ) -> Result<(), TreeValidationError> {
        let old_root = self.root;
        let branch_root = self.import(branch)?;
        let new_root = self.nodes.len() as NodeId;

        let (low, high) = match side {
            GraftSide::Below => (branch_root, old_root),
            GraftSide::Above => (old_root, branch_root),
        };
        self.nodes[low as usize].condition = Some(SplitCondition::numeric(SplitOp::Le, threshold));
        self.nodes[high as usize].condition = Some(SplitCondition::numeric(SplitOp::Gt, threshold));
        self.nodes[low as usize].parent = Some(new_root);
        self.nodes[high as usize].parent = Some(new_root);

        self.nodes.push(Node {
            parent: None,
            depth: 0,
            condition: None,
            kind: NodeKind::Internal {
                attribute,
                children: vec![low, high],
            },
        });
        self.root = new_root;
        self.rebuild_index()
    }

    /// Let `subtree` take over the slot of `leaf`.
    ///
    /// The slot keeps its incoming condition and parent, so the parent's child
    /// list stays valid. Other node ids are unaffected; call
    /// [`rebuild_index`](Self::rebuild_index) once all replacements are done.
    pub fn replace_leaf(&mut self, leaf: NodeId, subtree: Tree) -> Result<(), TreeValidationError> {
        if self.leaf(leaf).is_none() {
            return Err(TreeValidationError::NotALeaf { node: leaf });
        }
        let sub_root = self.import(subtree)?;
        let mut node = std::mem::replace(&mut self.nodes[sub_root as usize], Node::leaf(""));

        let slot = &self.nodes[leaf as usize];
        node.condition = slot.condition.clone();
        node.parent = slot.parent;
        node.depth = slot.depth;
        for &child in node.children() {
            self.nodes[child as usize].parent = Some(leaf);
        }
        self.nodes[leaf as usize] = node;
        Ok(())
    }

    /// Append the reachable nodes of `other`; returns the id of its root.
    fn import(&mut self, mut other: Tree) -> Result<NodeId, TreeValidationError> {
        other.rebuild_index()?;
        let base = self.nodes.len() as NodeId;
        let root = other.root + base;
        for mut node in other.nodes {
            node.parent = node.parent.map(|p| p + base);
            if let NodeKind::Internal { children, .. } = &mut node.kind {
                for child in children.iter_mut() {
                    *child += base;
                }
            }
            self.nodes.push(node);
        }
        Ok(root)
    }

    /// Compact the arena in pre-order from the root and refresh depths,
    /// parents, the leaf index, the node count and the tree depth.
    ///
    /// The tree is left untouched on error.
    pub fn rebuild_index(&mut self) -> Result<(), TreeValidationError> {
        let n = self.nodes.len();
        if n == 0 || self.root as usize >= n {
            return Err(TreeValidationError::EmptyTree);
        }

        // Plan the new order first so nothing is moved on error.
        let mut remap: Vec<Option<NodeId>> = vec![None; n];
        let mut order: Vec<(NodeId, Option<NodeId>, u32)> = Vec::with_capacity(n);
        let mut stack = vec![(self.root, None, 0u32)];
        while let Some((old, parent, depth)) = stack.pop() {
            if remap[old as usize].is_some() {
                return Err(TreeValidationError::DuplicateVisit { node: old });
            }
            let new_id = order.len() as NodeId;
            remap[old as usize] = Some(new_id);
            order.push((old, parent, depth));
            for &child in self.nodes[old as usize].children().iter().rev() {
                if child == old {
                    return Err(TreeValidationError::SelfLoop { node: old });
                }
                if child as usize >= n {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node: old,
                        child,
                        n_nodes: n,
                    });
                }
                stack.push((child, Some(new_id), depth + 1));
            }
        }

        let mut old_nodes: Vec<Option<Node>> = std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        let mut leaves = Vec::new();
        let mut max_depth = 0;
        for &(old, parent, depth) in &order {
            let Some(mut node) = old_nodes[old as usize].take() else {
                continue;
            };
            node.parent = parent;
            node.depth = depth;
            if let NodeKind::Internal { children, .. } = &mut node.kind {
                for child in children.iter_mut() {
                    if let Some(id) = remap[*child as usize] {
                        *child = id;
                    }
                }
            } else {
                leaves.push(nodes.len() as NodeId);
            }
            max_depth = max_depth.max(depth);
            nodes.push(node);
        }

        self.n_nodes = nodes.len();
        self.nodes = nodes;
        self.root = 0;
        self.leaves = leaves;
        self.depth = max_depth;
        Ok(())
    }

    /// Check the structural invariants of the tree.
    ///
    /// - every internal node has at least two children, all in bounds
    /// - children point back at their parent
    /// - no cycles, no node reached twice, no unreachable node
    /// - leaf distributions have as many counts as class values
    /// - the leaf index matches the reachable leaves
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_nodes = self.nodes.len();
        if n_nodes == 0 || self.root as usize >= n_nodes {
            return Err(TreeValidationError::EmptyTree);
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(self.root, 0)];
        let mut reachable_leaves = 0;

        while let Some((node, phase)) = stack.pop() {
            let index = node as usize;
            if phase == 1 {
                color[index] = 2;
                continue;
            }
            match color[index] {
                0 => {}
                1 => return Err(TreeValidationError::CycleDetected { node }),
                _ => return Err(TreeValidationError::DuplicateVisit { node }),
            }
            color[index] = 1;
            stack.push((node, 1));

            match &self.nodes[index].kind {
                NodeKind::Leaf(leaf) => {
                    reachable_leaves += 1;
                    if let Some(d) = &leaf.distribution {
                        if d.values().len() != d.counts().len() {
                            return Err(TreeValidationError::DistributionMismatch {
                                node,
                                n_values: d.values().len(),
                                n_counts: d.counts().len(),
                            });
                        }
                    }
                }
                NodeKind::Internal { children, .. } => {
                    if children.len() < 2 {
                        return Err(TreeValidationError::TooFewChildren {
                            node,
                            n_children: children.len(),
                        });
                    }
                    for &child in children.iter().rev() {
                        if child == node {
                            return Err(TreeValidationError::SelfLoop { node });
                        }
                        if child as usize >= n_nodes {
                            return Err(TreeValidationError::ChildOutOfBounds {
                                node,
                                child,
                                n_nodes,
                            });
                        }
                        if self.nodes[child as usize].parent != Some(node) {
                            return Err(TreeValidationError::ParentMismatch { node: child, parent: node });
                        }
                        stack.push((child, 0));
                    }
                }
            }
        }

        if let Some(i) = color.iter().position(|&c| c == 0) {
            return Err(TreeValidationError::UnreachableNode { node: i as NodeId });
        }
        let indexed_ok = self.leaves.iter().all(|&id| self.leaf(id).is_some());
        if !indexed_ok || self.leaves.len() != reachable_leaves {
            return Err(TreeValidationError::LeafIndexOutOfSync {
                indexed: self.leaves.len(),
                reachable: reachable_leaves,
            });
        }
        Ok(())
    }
}

// ============================================================================
// TreeBuilder
// ============================================================================

/// Grows a tree top-down: start with [`init_root`](Self::init_root), then
/// [`split`](Self::split) nodes and [`make_leaf`](Self::make_leaf) the rest.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to a single undecided root.
    pub fn init_root(&mut self) -> NodeId {
        self.nodes.clear();
        self.nodes.push(Node::leaf(""));
        0
    }

    /// Turn `node` into an internal node with one child per condition.
    /// Returns the new child ids in condition order.
    pub fn split(
        &mut self,
        node: NodeId,
        attribute: SplitAttribute,
        conditions: Vec<SplitCondition>,
    ) -> Vec<NodeId> {
        let depth = self.nodes[node as usize].depth + 1;
        let mut children = Vec::with_capacity(conditions.len());
        for condition in conditions {
            children.push(self.nodes.len() as NodeId);
            self.nodes.push(Node {
                parent: Some(node),
                depth,
                condition: Some(condition),
                kind: NodeKind::Leaf(Leaf::new("")),
            });
        }
        self.nodes[node as usize].kind = NodeKind::Internal {
            attribute,
            children: children.clone(),
        };
        children
    }

    pub fn make_leaf(&mut self, node: NodeId, prediction: impl Into<String>) {
        self.nodes[node as usize].kind = NodeKind::Leaf(Leaf::new(prediction));
    }

    #[inline]
    pub fn depth(&self, node: NodeId) -> u32 {
        self.nodes[node as usize].depth
    }

    /// Index and validate the grown tree.
    pub fn finish(self) -> Result<Tree, TreeValidationError> {
        let mut tree = Tree {
            nodes: self.nodes,
            root: 0,
            leaves: Vec::new(),
            n_nodes: 0,
            depth: 0,
            classes: ClassDistribution::default(),
            range_min: Vec::new(),
            range_max: Vec::new(),
        };
        tree.rebuild_index()?;
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, Schema};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new(
                "t",
                vec![
                    Attribute::numeric("x"),
                    Attribute::categorical("color", ["red", "blue"]),
                    Attribute::categorical("class", Vec::<String>::new()),
                ],
                None,
            )
            .unwrap(),
        )
    }

    fn x() -> SplitAttribute {
        SplitAttribute {
            index: 0,
            name: "x".into(),
            numeric: true,
        }
    }

    fn color() -> SplitAttribute {
        SplitAttribute {
            index: 1,
            name: "color".into(),
            numeric: false,
        }
    }

    /// x <= 5 -> (color = red -> yes, color = blue -> no); x > 5 -> yes
    fn sample_tree() -> Tree {
        let mut b = TreeBuilder::new();
        let root = b.init_root();
        let kids = b.split(
            root,
            x(),
            vec![
                SplitCondition::numeric(SplitOp::Le, 5.0),
                SplitCondition::numeric(SplitOp::Gt, 5.0),
            ],
        );
        let grand = b.split(
            kids[0],
            color(),
            vec![SplitCondition::category("red"), SplitCondition::category("blue")],
        );
        b.make_leaf(grand[0], "yes");
        b.make_leaf(grand[1], "no");
        b.make_leaf(kids[1], "yes");
        b.finish().unwrap()
    }

    fn batch(rows: &[[&str; 3]]) -> BatchStats {
        BatchStats::from_rows(schema(), rows.iter()).unwrap()
    }

    fn record(fields: [&str; 3]) -> Record {
        Record::parse(&schema(), &fields, 0).unwrap()
    }

    #[test]
    fn builder_indexes_in_preorder() {
        let tree = sample_tree();
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.depth(), 2);
        let predictions: Vec<&str> = tree.iter_leaves().map(|(_, l)| l.prediction.as_str()).collect();
        assert_eq!(predictions, ["yes", "no", "yes"]);
        tree.validate().unwrap();
    }

    #[test]
    fn routes_and_predicts() {
        let tree = sample_tree();
        assert_eq!(tree.predict(&record(["1", "red", "a"])).unwrap(), "yes");
        assert_eq!(tree.predict(&record(["5", "blue", "a"])).unwrap(), "no");
        assert_eq!(tree.predict(&record(["7", "?", "a"])).unwrap(), "yes");
    }

    #[test]
    fn unmatched_value_is_an_error() {
        let tree = sample_tree();
        let err = tree.route_record(&record(["1", "?", "a"])).unwrap_err();
        assert!(matches!(err, RouteError::NoMatchingChild { ref attribute, .. } if attribute == "color"));
    }

    #[test]
    fn single_child_split_is_rejected() {
        let mut b = TreeBuilder::new();
        let root = b.init_root();
        let kids = b.split(root, x(), vec![SplitCondition::numeric(SplitOp::Le, 1.0)]);
        b.make_leaf(kids[0], "a");
        let err = b.finish().unwrap_err();
        assert_eq!(err, TreeValidationError::TooFewChildren { node: 0, n_children: 1 });
    }

    #[test]
    fn leaf_stats_first_batch_then_merge() {
        let mut tree = sample_tree();
        tree.update_leaf_stats(&batch(&[["1", "red", "no"], ["2", "red", "no"], ["6", "red", "yes"]]), true);
        let first = tree.leaf(tree.leaves()[0]).unwrap();
        assert_eq!(first.prediction, "no");
        assert_eq!(first.confidence, 1.0);
        assert_eq!(first.records.len(), 2);
        let empty = tree.leaf(tree.leaves()[1]).unwrap();
        assert_eq!(empty.prediction, "no");
        assert_eq!(empty.confidence, 0.0);

        tree.update_leaf_stats(&batch(&[["1", "red", "maybe"], ["1", "red", "yes"], ["1", "red", "yes"]]), false);
        assert_eq!(tree.vocabulary(), ["no", "yes", "maybe"]);
        let first = tree.leaf(tree.leaves()[0]).unwrap();
        let d = first.distribution.as_ref().unwrap();
        assert_eq!(d.counts(), &[2, 2, 1]);
        assert_eq!(first.prediction, "no");
        assert_eq!(first.records.len(), 5);
        for (_, leaf) in tree.iter_leaves() {
            assert_eq!(leaf.distribution.as_ref().unwrap().values().len(), 3);
        }
        assert_eq!(tree.class_distribution().counts(), &[2, 3, 1]);
    }

    #[test]
    fn unroutable_records_are_skipped() {
        let mut tree = sample_tree();
        tree.update_leaf_stats(&batch(&[["1", "?", "no"], ["9", "red", "yes"]]), true);
        let total: usize = tree.iter_leaves().map(|(_, l)| l.records.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn graft_root_above_keeps_old_tree_below() {
        let mut tree = sample_tree();
        tree.graft_root(x(), 15.0, Tree::single_leaf("late"), GraftSide::Above).unwrap();
        tree.validate().unwrap();

        let root = tree.node(tree.root());
        assert_eq!(root.split_attribute().unwrap().name, "x");
        let children = root.children();
        assert_eq!(children.len(), 2);
        let low = tree.node(children[0]);
        let high = tree.node(children[1]);
        assert_eq!(low.condition, Some(SplitCondition::numeric(SplitOp::Le, 15.0)));
        assert!(!low.is_leaf());
        assert_eq!(high.condition, Some(SplitCondition::numeric(SplitOp::Gt, 15.0)));
        assert_eq!(high.as_leaf().unwrap().prediction, "late");

        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.predict(&record(["20", "red", "a"])).unwrap(), "late");
        assert_eq!(tree.predict(&record(["5", "blue", "a"])).unwrap(), "no");
    }

    #[test]
    fn graft_root_below() {
        let mut tree = sample_tree();
        tree.graft_root(x(), -3.0, Tree::single_leaf("early"), GraftSide::Below).unwrap();
        let root = tree.node(tree.root());
        let low = tree.node(root.children()[0]);
        assert_eq!(low.as_leaf().unwrap().prediction, "early");
        assert_eq!(tree.predict(&record(["-5", "red", "a"])).unwrap(), "early");
        assert_eq!(tree.predict(&record(["1", "red", "a"])).unwrap(), "yes");
    }

    #[test]
    fn replace_leaf_keeps_incoming_condition() {
        let mut tree = sample_tree();
        let target = tree.leaves()[2];
        let mut b = TreeBuilder::new();
        let root = b.init_root();
        let kids = b.split(
            root,
            x(),
            vec![
                SplitCondition::numeric(SplitOp::Le, 8.0),
                SplitCondition::numeric(SplitOp::Gt, 8.0),
            ],
        );
        b.make_leaf(kids[0], "mid");
        b.make_leaf(kids[1], "high");
        tree.replace_leaf(target, b.finish().unwrap()).unwrap();
        tree.rebuild_index().unwrap();
        tree.validate().unwrap();

        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.n_nodes(), 7);
        assert_eq!(tree.predict(&record(["6", "red", "a"])).unwrap(), "mid");
        assert_eq!(tree.predict(&record(["9", "red", "a"])).unwrap(), "high");
        let replaced = tree
            .nodes()
            .iter()
            .find(|n| n.condition == Some(SplitCondition::numeric(SplitOp::Gt, 5.0)))
            .unwrap();
        assert_eq!(replaced.children().len(), 2);
    }

    #[test]
    fn replace_rejects_internal_node() {
        let mut tree = sample_tree();
        let err = tree.replace_leaf(tree.root(), Tree::single_leaf("a")).unwrap_err();
        assert_eq!(err, TreeValidationError::NotALeaf { node: 0 });
    }

    #[test]
    fn range_extends() {
        let mut tree = sample_tree();
        tree.set_range(&batch(&[["1", "red", "a"], ["3", "red", "a"]]));
        tree.extend_range(&batch(&[["-1", "red", "a"]]));
        assert_eq!(tree.range_min()[0], -1.0);
        assert_eq!(tree.range_max()[0], 3.0);
    }
}
