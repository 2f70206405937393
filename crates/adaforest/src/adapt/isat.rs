//! ISAT structural repair.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::data::{BatchStats, Schema};
use crate::induction::TreeInducer;
use crate::repr::{Forest, GraftSide, NodeId, SplitAttribute, Tree, TreeValidationError};

use super::drift::{assess, RepairAssessment};
use super::RepairParams;

/// Leaves at this depth or deeper are never refined.
const MAX_REFINE_DEPTH: u32 = 20;

/// A repaired tree broke a structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("tree {tree_idx} violates a structural invariant after repair: {source}")]
    StructuralInvariantViolation {
        tree_idx: usize,
        #[source]
        source: TreeValidationError,
    },
}

/// Result of [`StructuralRepairer::repair_or_skip`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub assessment: RepairAssessment,
    /// Whether ISAT ran.
    pub repaired: bool,
    /// Class values the batch introduced to the forest.
    pub num_new: usize,
}

/// Runs ISAT with a given inducer for the subtrees it grafts.
pub struct StructuralRepairer<'a> {
    inducer: &'a dyn TreeInducer,
    params: RepairParams,
}

impl<'a> StructuralRepairer<'a> {
    pub fn new(inducer: &'a dyn TreeInducer, params: RepairParams) -> Self {
        Self { inducer, params }
    }

    #[inline]
    pub fn params(&self) -> &RepairParams {
        &self.params
    }

    /// Assess the forest on `batch` and repair it if it is repairable, if
    /// `force` is set, or if the batch brings class values the forest has
    /// not seen.
    pub fn repair_or_skip(
        &self,
        forest: &mut Forest,
        batch: &BatchStats,
        force: bool,
    ) -> Result<RepairOutcome, RepairError> {
        let num_new = forest.count_new_classes(batch.class_values());
        let assessment = assess(forest, batch, &self.params);
        let repaired = assessment.repairable || force || num_new > 0;
        debug!(
            repairable = assessment.repairable,
            force,
            num_new,
            repaired,
            "repair decision"
        );
        if repaired {
            self.repair(forest, batch, num_new > 0)?;
        }
        Ok(RepairOutcome {
            assessment,
            repaired,
            num_new,
        })
    }

    /// Run ISAT on every tree. Perturbed flags must be current (see
    /// [`assess`]).
    pub fn repair(&self, forest: &mut Forest, batch: &BatchStats, new_classes: bool) -> Result<(), RepairError> {
        forest.extend_vocabulary(batch.class_values());
        self.params
            .parallelism
            .maybe_par_map_mut(forest.trees_mut(), |i, tree| {
                self.repair_tree(tree, batch, new_classes, self.params.seed.wrapping_add(i as u64))
                    .map_err(|source| RepairError::StructuralInvariantViolation { tree_idx: i, source })
            })
            .into_iter()
            .collect()
    }

    fn repair_tree(
        &self,
        tree: &mut Tree,
        batch: &BatchStats,
        new_classes: bool,
        seed: u64,
    ) -> Result<(), TreeValidationError> {
        let gate = new_classes || tree.iter_leaves().any(|(_, leaf)| leaf.perturbed);
        if gate {
            self.graft_ranges(tree, batch, seed)?;
        }
        tree.update_leaf_stats(batch, false);
        if gate {
            self.refine_leaves(tree, batch.schema(), seed)?;
        }
        tree.rebuild_index()?;
        tree.validate()?;
        tree.extend_range(batch);
        Ok(())
    }

    // --- range grafting ---

    /// Graft new roots for batch ranges outside the tree's range.
    ///
    /// A disjoint range wins over overlaps, and a batch above the tree wins
    /// a tie with a batch below it. Otherwise the lower overlap is grafted
    /// first and the upper one wraps it, so the upper split is the root.
    fn graft_ranges(&self, tree: &mut Tree, batch: &BatchStats, seed: u64) -> Result<(), TreeValidationError> {
        let schema = batch.schema();
        let attributes: Vec<usize> = schema
            .numeric_indices()
            .filter(|&a| {
                let finite = |range: &[f64]| range.get(a).is_some_and(|v| v.is_finite());
                finite(tree.range_min()) && finite(tree.range_max()) && finite(batch.min()) && finite(batch.max())
            })
            .collect();
        let (t_min, t_max) = (tree.range_min().to_vec(), tree.range_max().to_vec());
        let (b_min, b_max) = (batch.min(), batch.max());

        let above = max_gap(&attributes, |a| b_min[a] - t_max[a]);
        let below = max_gap(&attributes, |a| t_min[a] - b_max[a]);
        let disjoint = match (above, below) {
            (Some((a, gap)), below) if below.map_or(true, |(_, other)| gap >= other) => {
                Some((gap, a, GraftSide::Above, (b_min[a] + t_max[a]) / 2.0))
            }
            (_, Some((a, gap))) => Some((gap, a, GraftSide::Below, (t_min[a] + b_max[a]) / 2.0)),
            _ => None,
        };
        if let Some((gap, a, side, threshold)) = disjoint {
            let min_leaf = self.params.min_leaf_size;
            let branch = if batch.n_classes() >= 2 && batch.n_records() > min_leaf {
                self.induce_subtree(batch, seed)
            } else {
                majority_leaf(batch)
            };
            debug!(attribute = a, threshold, gap, ?side, "grafting disjoint range");
            return tree.graft_root(split_attribute(schema, a), threshold, branch, side);
        }

        if let Some((a, _)) = max_gap(&attributes, |a| t_min[a] - b_min[a]) {
            let part = batch.partition(a, |v| v <= t_min[a]);
            if !part.is_empty() {
                debug!(attribute = a, threshold = t_min[a], n_records = part.n_records(), "grafting lower range");
                let branch = self.branch_for(&part, seed);
                tree.graft_root(split_attribute(schema, a), t_min[a], branch, GraftSide::Below)?;
            }
        }
        if let Some((a, _)) = max_gap(&attributes, |a| b_max[a] - t_max[a]) {
            let part = batch.partition(a, |v| v > t_max[a]);
            if part.n_records() > self.params.min_leaf_size {
                debug!(attribute = a, threshold = t_max[a], n_records = part.n_records(), "grafting upper range");
                let branch = self.branch_for(&part, seed);
                tree.graft_root(split_attribute(schema, a), t_max[a], branch, GraftSide::Above)?;
            }
        }
        Ok(())
    }

    /// Subtree for an overlap partition: induced when it holds two classes
    /// or more, a leaf predicting its class otherwise.
    fn branch_for(&self, part: &BatchStats, seed: u64) -> Tree {
        if part.n_classes() >= 2 {
            self.induce_subtree(part, seed)
        } else {
            majority_leaf(part)
        }
    }

    /// One tree induced on `batch`, or a majority leaf when induction fails.
    fn induce_subtree(&self, batch: &BatchStats, seed: u64) -> Tree {
        let induced = self
            .inducer
            .induce(batch, 1, self.params.min_leaf_size, seed)
            .and_then(|induction| induction.into_trees(batch.schema()));
        match induced {
            Ok(trees) => match trees.into_iter().next() {
                Some(tree) => tree,
                None => majority_leaf(batch),
            },
            Err(err) => {
                warn!(inducer = self.inducer.name(), %err, "subtree induction failed, grafting a majority leaf");
                majority_leaf(batch)
            }
        }
    }

    // --- entropy refinement ---

    /// Replace perturbed, impure, well-populated leaves by subtrees induced
    /// on their retained records.
    fn refine_leaves(&self, tree: &mut Tree, schema: &Arc<Schema>, seed: u64) -> Result<(), TreeValidationError> {
        let min_leaf = self.params.min_leaf_size;
        let targets: Vec<NodeId> = tree
            .iter_leaves()
            .filter(|&(id, leaf)| {
                leaf.perturbed
                    && leaf.distribution.as_ref().is_some_and(|d| d.entropy() > 0.0)
                    && tree.node(id).depth < MAX_REFINE_DEPTH
                    && leaf.records.len() > min_leaf
            })
            .map(|(id, _)| id)
            .collect();

        let mut replaced = 0;
        for id in targets {
            let Some(leaf) = tree.leaf(id) else {
                continue;
            };
            let vocabulary = leaf
                .distribution
                .as_ref()
                .map(|d| d.values().to_vec())
                .unwrap_or_default();
            let records = match BatchStats::from_records(Arc::clone(schema), leaf.records.clone()) {
                Ok(records) => records,
                Err(err) => {
                    debug!(leaf = id, %err, "leaf records unusable for refinement");
                    continue;
                }
            };
            if records.n_classes() < 2 {
                continue;
            }
            let mut subtree = self.induce_subtree(&records, seed);
            if subtree.is_single_leaf() {
                continue;
            }
            subtree.seed_leaf_stats(&records, &vocabulary);
            debug!(leaf = id, n_records = records.n_records(), n_leaves = subtree.n_leaves(), "refining leaf");
            tree.replace_leaf(id, subtree)?;
            replaced += 1;
        }
        if replaced > 0 {
            tree.rebuild_index()?;
        }
        Ok(())
    }
}

fn split_attribute(schema: &Schema, attribute: usize) -> SplitAttribute {
    SplitAttribute {
        index: attribute,
        name: schema.attribute(attribute).name().to_string(),
        numeric: true,
    }
}

fn majority_leaf(batch: &BatchStats) -> Tree {
    Tree::single_leaf(batch.majority_class().unwrap_or_default())
}

/// Attribute with the largest positive gap and that gap; ties keep the
/// first attribute.
fn max_gap(attributes: &[usize], gap: impl Fn(usize) -> f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for &a in attributes {
        let g = gap(a);
        if g > 0.0 && best.map_or(true, |(_, b)| g > b) {
            best = Some((a, g));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::induction::HeuristicInducer;
    use crate::repr::{SplitCondition, SplitOp};
    use crate::testing::{labelled_batch, separable_batch};

    fn params() -> RepairParams {
        RepairParams {
            min_leaf_size: 1,
            ..RepairParams::default()
        }
    }

    fn forest() -> Forest {
        Forest::build_from_inducer(&separable_batch(20, 0.0), &HeuristicInducer::default(), 1, 1, 0)
    }

    #[test]
    fn identical_batch_changes_nothing_structural() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        let before = forest.tree(0).nodes().len();
        let outcome = repairer.repair_or_skip(&mut forest, &separable_batch(20, 0.0), false).unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.assessment.total_perturbed, 0);
        assert_eq!(outcome.num_new, 0);
        assert_eq!(forest.tree(0).nodes().len(), before);
        let leaf = forest.tree(0).leaf(forest.tree(0).leaves()[0]).unwrap();
        assert_eq!(leaf.distribution.as_ref().unwrap().counts(), &[20, 0]);
        assert_eq!(leaf.records.len(), 20);
    }

    #[test]
    fn unrepairable_batch_is_skipped() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        let before = forest.clone();
        let flipped = labelled_batch(&[(1.0, 0.0, "no"), (2.0, 0.0, "no"), (3.0, 0.0, "no")]);
        let outcome = repairer.repair_or_skip(&mut forest, &flipped, false).unwrap();
        assert!(!outcome.repaired);
        assert_eq!(forest.to_rule_set(), before.to_rule_set());
    }

    #[test]
    fn disjoint_range_above_grafts_new_root() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        let later = separable_batch(20, 20.0);
        repairer.repair_or_skip(&mut forest, &later, true).unwrap();

        let tree = forest.tree(0);
        let root = tree.node(tree.root());
        assert_eq!(root.split_attribute().unwrap().name, "x1");
        let low = tree.node(root.children()[0]);
        let high = tree.node(root.children()[1]);
        // midpoint of the old max (9.5) and the new min (20)
        assert_eq!(low.condition, Some(SplitCondition::numeric(SplitOp::Le, 14.75)));
        assert_eq!(high.condition, Some(SplitCondition::numeric(SplitOp::Gt, 14.75)));
        assert_eq!(low.split_attribute().unwrap().name, "x1");
        assert_eq!(forest.accuracy(&later), 100.0);
        assert_eq!(forest.accuracy(&separable_batch(20, 0.0)), 100.0);
        assert_eq!(tree.range_max()[0], 29.5);
        forest.validate().unwrap();
    }

    #[test]
    fn disjoint_range_below_keeps_old_tree_above() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        let earlier = labelled_batch(&[(-10.0, 1.0, "no"), (-9.0, 2.0, "no")]);
        repairer.repair_or_skip(&mut forest, &earlier, true).unwrap();

        let tree = forest.tree(0);
        let root = tree.node(tree.root());
        let low = tree.node(root.children()[0]);
        assert_eq!(low.condition, Some(SplitCondition::numeric(SplitOp::Le, -4.5)));
        assert_eq!(low.as_leaf().unwrap().prediction, "no");
        assert_eq!(tree.range_min()[0], -10.0);
    }

    #[test]
    fn upper_overlap_grafts_at_old_max() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        let batch = labelled_batch(&[(8.0, 1.0, "no"), (12.0, 1.0, "maybe"), (13.0, 2.0, "maybe")]);
        let outcome = repairer.repair_or_skip(&mut forest, &batch, false).unwrap();
        assert_eq!(outcome.num_new, 1);
        assert!(outcome.repaired);

        let tree = forest.tree(0);
        let root = tree.node(tree.root());
        let high = tree.node(root.children()[1]);
        assert_eq!(high.condition, Some(SplitCondition::numeric(SplitOp::Gt, 9.5)));
        assert_eq!(high.as_leaf().unwrap().prediction, "maybe");
        assert_eq!(forest.vocabulary(), ["yes", "no", "maybe"]);
        for (_, leaf) in tree.iter_leaves() {
            assert_eq!(leaf.distribution.as_ref().unwrap().values(), ["yes", "no", "maybe"]);
        }
    }

    #[test]
    fn perturbed_impure_leaf_is_refined() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        // the low leaf [0, 4.75] now says `no` for x2 >= 5
        let rows: Vec<(f64, f64, &str)> = (0..10)
            .map(|i| (i as f64 * 0.45, (i % 10) as f64, if i % 10 >= 5 { "no" } else { "yes" }))
            .collect();
        let batch = labelled_batch(&rows);
        repairer.repair_or_skip(&mut forest, &batch, true).unwrap();

        let tree = forest.tree(0);
        assert!(tree.n_leaves() > 2);
        let refined = tree.node(tree.node(tree.root()).children()[0]);
        assert!(!refined.is_leaf());
        forest.validate().unwrap();
    }

    #[test]
    fn disjoint_tie_prefers_batch_above() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        // x1 lies 10 below the trained [0, 9.5], x2 lies 10 above [0, 9]
        let batch = labelled_batch(&[(-10.0, 19.0, "no"), (-10.0, 19.0, "no")]);
        repairer.repair_or_skip(&mut forest, &batch, true).unwrap();

        let tree = forest.tree(0);
        let root = tree.node(tree.root());
        assert_eq!(root.split_attribute().unwrap().name, "x2");
        let low = tree.node(root.children()[0]);
        let high = tree.node(root.children()[1]);
        assert_eq!(low.condition, Some(SplitCondition::numeric(SplitOp::Le, 14.0)));
        assert_eq!(low.split_attribute().unwrap().name, "x1");
        assert_eq!(high.condition, Some(SplitCondition::numeric(SplitOp::Gt, 14.0)));
        assert_eq!(high.as_leaf().unwrap().prediction, "no");
    }

    #[test]
    fn overlap_on_both_sides_roots_the_upper_graft() {
        let inducer = HeuristicInducer::default();
        let repairer = StructuralRepairer::new(&inducer, params());
        let mut forest = forest();
        // x2 reaches below the trained minimum, x1 above the trained maximum
        let batch = labelled_batch(&[
            (5.0, -3.0, "no"),
            (6.0, -2.0, "no"),
            (12.0, 5.0, "maybe"),
            (13.0, 6.0, "maybe"),
        ]);
        repairer.repair_or_skip(&mut forest, &batch, true).unwrap();
        forest.validate().unwrap();

        let tree = forest.tree(0);
        let root = tree.node(tree.root());
        assert_eq!(root.split_attribute().unwrap().name, "x1");
        let upper = tree.node(root.children()[1]);
        assert_eq!(upper.condition, Some(SplitCondition::numeric(SplitOp::Gt, 9.5)));
        assert_eq!(upper.as_leaf().unwrap().prediction, "maybe");

        let lower = tree.node(root.children()[0]);
        assert_eq!(lower.condition, Some(SplitCondition::numeric(SplitOp::Le, 9.5)));
        assert_eq!(lower.split_attribute().unwrap().name, "x2");
        let below = tree.node(lower.children()[0]);
        assert_eq!(below.condition, Some(SplitCondition::numeric(SplitOp::Le, 0.0)));
        assert_eq!(below.as_leaf().unwrap().prediction, "no");

        // outside both trained ranges: the upper graft decides
        let outside = labelled_batch(&[(14.0, -7.0, "maybe")]);
        assert_eq!(tree.predict(&outside.records()[0]).unwrap(), "maybe");
    }

    #[test]
    fn gaps_prefer_first_attribute_on_ties() {
        assert_eq!(max_gap(&[0, 1], |_| 1.0), Some((0, 1.0)));
        assert_eq!(max_gap(&[0, 1], |a| a as f64), Some((1, 1.0)));
        assert_eq!(max_gap(&[0, 1], |_| -1.0), None);
    }
}
