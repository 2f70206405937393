//! Perturbation detection and repairability.

use serde::Serialize;
use tracing::debug;

use crate::data::BatchStats;
use crate::repr::{merge_vocabulary, Forest, Tree};

use super::RepairParams;

/// Mark the leaves of `tree` whose confidence the batch would degrade.
///
/// The batch is routed over the union of the tree's and the batch's
/// vocabularies. A leaf with statistics is perturbed iff its current
/// confidence exceeds the confidence of its counts merged with the routed
/// ones by more than `tolerance`. Only the perturbed flags change.
///
/// Returns the number of perturbed leaves.
pub fn identify_perturbed_leaves(tree: &mut Tree, batch: &BatchStats, tolerance: f64) -> usize {
    let vocabulary = merge_vocabulary(tree.vocabulary(), batch.class_values()).merged;
    let routed = tree.route_batch(batch, &vocabulary);
    let leaves = tree.leaves().to_vec();

    let mut n_perturbed = 0;
    for (p, id) in leaves.into_iter().enumerate() {
        let Some(leaf) = tree.leaf_mut(id) else {
            continue;
        };
        leaf.perturbed = match &leaf.distribution {
            Some(prior) => {
                let row = routed.counts.row(p).to_vec();
                let updated = prior.merged(&vocabulary, &vocabulary, &row);
                prior.confidence() > updated.confidence() + tolerance
            }
            None => false,
        };
        n_perturbed += usize::from(leaf.perturbed);
    }
    n_perturbed
}

/// How much of a forest a batch perturbs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairAssessment {
    pub perturbed_per_tree: Vec<usize>,
    pub total_perturbed: usize,
    pub total_leaves: usize,
    /// `total_perturbed / total_leaves`, 0 for a forest without leaves.
    pub ratio: f64,
    /// `ratio <= repairable_threshold`.
    pub repairable: bool,
}

/// Flag perturbed leaves in every tree and decide whether the forest is
/// repairable for this batch.
pub fn assess(forest: &mut Forest, batch: &BatchStats, params: &RepairParams) -> RepairAssessment {
    let tolerance = params.error_tolerance;
    let perturbed_per_tree = params
        .parallelism
        .maybe_par_map_mut(forest.trees_mut(), |_, tree| identify_perturbed_leaves(tree, batch, tolerance));
    let total_perturbed: usize = perturbed_per_tree.iter().sum();
    let total_leaves = forest.n_leaves();
    let ratio = if total_leaves == 0 {
        0.0
    } else {
        total_perturbed as f64 / total_leaves as f64
    };
    let repairable = ratio <= params.repairable_threshold;
    debug!(total_perturbed, total_leaves, ratio, repairable, "repair assessment");
    RepairAssessment {
        perturbed_per_tree,
        total_perturbed,
        total_leaves,
        ratio,
        repairable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::induction::HeuristicInducer;
    use crate::testing::{labelled_batch, separable_batch};

    fn forest() -> Forest {
        Forest::build_from_inducer(&separable_batch(20, 0.0), &HeuristicInducer::default(), 1, 1, 0)
    }

    #[test]
    fn identical_batch_perturbs_nothing() {
        let mut forest = forest();
        let assessment = assess(&mut forest, &separable_batch(20, 0.0), &RepairParams::default());
        assert_eq!(assessment.total_perturbed, 0);
        assert_eq!(assessment.total_leaves, 2);
        assert_eq!(assessment.ratio, 0.0);
        assert!(assessment.repairable);
    }

    #[test]
    fn flipped_labels_perturb_the_low_leaf() {
        let mut forest = forest();
        let flipped = labelled_batch(&[(1.0, 0.0, "no"), (2.0, 0.0, "no"), (3.0, 0.0, "no")]);
        let assessment = assess(&mut forest, &flipped, &RepairParams::default());
        assert_eq!(assessment.perturbed_per_tree, vec![1]);
        assert_eq!(assessment.ratio, 0.5);
        assert!(!assessment.repairable);

        let tree = forest.tree(0);
        let flags: Vec<bool> = tree.iter_leaves().map(|(_, l)| l.perturbed).collect();
        assert_eq!(flags, [true, false]);
        // statistics are untouched
        assert_eq!(tree.leaf(tree.leaves()[0]).unwrap().confidence, 1.0);
    }

    #[test]
    fn tolerance_absorbs_small_drops() {
        let mut forest = forest();
        let batch = labelled_batch(&[(1.0, 0.0, "no")]);
        // low leaf goes from 10/10 to 10/11
        let tree = &mut forest.trees_mut()[0];
        assert_eq!(identify_perturbed_leaves(tree, &batch, 0.1), 0);
        assert_eq!(identify_perturbed_leaves(tree, &batch, 0.05), 1);
    }

    #[test]
    fn new_class_counts_as_disagreement() {
        let mut forest = forest();
        let batch = labelled_batch(&[(9.0, 0.0, "maybe"), (9.5, 0.0, "maybe")]);
        let n = identify_perturbed_leaves(&mut forest.trees_mut()[0], &batch, 0.01);
        assert_eq!(n, 1);
    }
}
