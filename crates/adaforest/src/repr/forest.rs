//! Forest representation (ensemble of trees sharing a class vocabulary).

use tracing::{debug, warn};

use crate::compat::ruleset::{parse_rule_set, write_rule_set, RuleSetError};
use crate::data::{BatchStats, Record};
use crate::induction::TreeInducer;

use super::distribution::merge_vocabulary;
use super::tree::{RouteError, TreeValidationError};
use super::Tree;

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestValidationError {
    #[error("tree {tree_idx} is invalid: {error}")]
    InvalidTree { tree_idx: usize, error: TreeValidationError },
}

/// Ordered trees voting over a forest-level class vocabulary.
///
/// The vocabulary only grows: values are appended in first-seen order as
/// batches introduce them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    trees: Vec<Tree>,
    vocabulary: Vec<String>,
}

impl Forest {
    /// An empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_trees(trees: Vec<Tree>, vocabulary: Vec<String>) -> Self {
        Self { trees, vocabulary }
    }

    /// Induce a forest on `batch`.
    ///
    /// When the inducer fails or yields no tree, the forest falls back to
    /// `ensemble_size` single leaves predicting the batch's majority class.
    /// Leaves get first-batch statistics and trees take the batch's range.
    pub fn build_from_inducer(
        batch: &BatchStats,
        inducer: &dyn TreeInducer,
        ensemble_size: usize,
        min_leaf_size: usize,
        seed: u64,
    ) -> Self {
        let induced = inducer
            .induce(batch, ensemble_size, min_leaf_size, seed)
            .and_then(|induction| induction.into_trees(batch.schema()));
        let trees = match induced {
            Ok(trees) if !trees.is_empty() => trees,
            Ok(_) => {
                warn!(inducer = inducer.name(), "inducer returned no trees, falling back to majority leaves");
                Self::majority_leaves(batch, ensemble_size)
            }
            Err(err) => {
                warn!(inducer = inducer.name(), %err, "induction failed, falling back to majority leaves");
                Self::majority_leaves(batch, ensemble_size)
            }
        };
        debug!(
            inducer = inducer.name(),
            n_trees = trees.len(),
            n_records = batch.n_records(),
            "forest built"
        );
        Self::seeded(trees, batch)
    }

    /// Parse rule-set text against the batch schema; the parsed trees get
    /// first-batch statistics over `batch` and its range.
    pub fn from_rule_set(text: &str, batch: &BatchStats) -> Result<Self, RuleSetError> {
        let trees = parse_rule_set(text, batch.schema())?;
        Ok(Self::seeded(trees, batch))
    }

    pub fn to_rule_set(&self) -> String {
        write_rule_set(&self.trees)
    }

    fn majority_leaves(batch: &BatchStats, ensemble_size: usize) -> Vec<Tree> {
        let majority = batch.majority_class().unwrap_or_default();
        (0..ensemble_size.max(1)).map(|_| Tree::single_leaf(majority)).collect()
    }

    fn seeded(mut trees: Vec<Tree>, batch: &BatchStats) -> Self {
        for tree in &mut trees {
            tree.update_leaf_stats(batch, true);
            tree.set_range(batch);
        }
        Self {
            trees,
            vocabulary: batch.class_values().to_vec(),
        }
    }

    // --- accessors ---

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Drop all trees and the vocabulary.
    pub fn clear(&mut self) {
        self.trees.clear();
        self.vocabulary.clear();
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    #[inline]
    pub fn trees_mut(&mut self) -> &mut [Tree] {
        &mut self.trees
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    /// Total number of indexed leaves.
    pub fn n_leaves(&self) -> usize {
        self.trees.iter().map(Tree::n_leaves).sum()
    }

    #[inline]
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Append unseen class values; returns how many were new.
    pub fn extend_vocabulary(&mut self, values: &[String]) -> usize {
        let merge = merge_vocabulary(&self.vocabulary, values);
        self.vocabulary = merge.merged;
        merge.num_new
    }

    /// Put `previous` first in the vocabulary, followed by the current values
    /// it lacks. Used when a forest is replaced so its successor keeps every
    /// class value seen so far.
    pub fn inherit_vocabulary(&mut self, previous: &[String]) {
        self.vocabulary = merge_vocabulary(previous, &self.vocabulary).merged;
    }

    /// Number of `values` not yet in the vocabulary.
    pub fn count_new_classes(&self, values: &[String]) -> usize {
        values.iter().filter(|v| !self.vocabulary.contains(v)).count()
    }

    // --- prediction ---

    /// Majority vote of the trees.
    ///
    /// A tree that cannot route the record abstains. Ties go to the value
    /// earliest in the vocabulary; predictions outside the vocabulary rank
    /// after it in order of appearance.
    ///
    /// # Errors
    ///
    /// The first tree's [`RouteError`] when no tree could vote, or
    /// [`RouteError::NoTrees`] for an empty forest.
    pub fn predict(&self, record: &Record) -> Result<&str, RouteError> {
        let mut votes = vec![0usize; self.vocabulary.len()];
        let mut others: Vec<(&str, usize)> = Vec::new();
        let mut first_error = None;

        for tree in &self.trees {
            match tree.predict(record) {
                Ok(class) => match self.vocabulary.iter().position(|v| v == class) {
                    Some(i) => votes[i] += 1,
                    None => match others.iter_mut().find(|(c, _)| *c == class) {
                        Some((_, n)) => *n += 1,
                        None => others.push((class, 1)),
                    },
                },
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        let mut best: Option<(&str, usize)> = None;
        let ranked = self
            .vocabulary
            .iter()
            .map(String::as_str)
            .zip(votes)
            .chain(others);
        for (class, n) in ranked {
            if n > 0 && best.map_or(true, |(_, b)| n > b) {
                best = Some((class, n));
            }
        }
        match best {
            Some((class, _)) => Ok(class),
            None => Err(first_error.unwrap_or(RouteError::NoTrees)),
        }
    }

    /// Percentage (0 to 100) of records whose label the forest predicts.
    /// Records no tree can route count as wrong; an empty batch scores 0.
    pub fn accuracy(&self, batch: &BatchStats) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }
        let correct = batch
            .records()
            .iter()
            .filter(|record| match (self.predict(record), batch.label(record)) {
                (Ok(predicted), Some(label)) => predicted == label,
                _ => false,
            })
            .count();
        100.0 * correct as f64 / batch.n_records() as f64
    }

    /// Validate every tree.
    pub fn validate(&self) -> Result<(), ForestValidationError> {
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| ForestValidationError::InvalidTree { tree_idx: i, error: e })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::induction::{HeuristicInducer, Induction, InductionError};
    use crate::testing::{labelled_batch, separable_batch};

    /// Returns a fixed rule set.
    struct RuleText(&'static str);

    impl TreeInducer for RuleText {
        fn name(&self) -> &'static str {
            "rules"
        }

        fn induce(&self, _: &BatchStats, _: usize, _: usize, _: u64) -> Result<Induction, InductionError> {
            Ok(Induction::RuleSet(self.0.to_string()))
        }
    }

    struct Failing;

    impl TreeInducer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn induce(&self, _: &BatchStats, _: usize, _: usize, _: u64) -> Result<Induction, InductionError> {
            Err(InductionError::EmptyBatch)
        }
    }

    #[test]
    fn builds_and_scores() {
        let batch = separable_batch(20, 0.0);
        let forest = Forest::build_from_inducer(&batch, &HeuristicInducer::default(), 1, 1, 0);
        assert_eq!(forest.n_trees(), 1);
        assert_eq!(forest.vocabulary(), ["yes", "no"]);
        assert_eq!(forest.accuracy(&batch), 100.0);
        forest.validate().unwrap();

        let tree = forest.tree(0);
        assert_eq!(tree.range_min()[0], 0.0);
        for (_, leaf) in tree.iter_leaves() {
            assert_eq!(leaf.confidence, 1.0);
            assert_eq!(leaf.records.len(), 10);
        }
    }

    #[test]
    fn rule_set_inducer_is_parsed() {
        let batch = separable_batch(20, 0.0);
        let inducer = RuleText("Tree 1:\nx1 <= 5 : yes\nx1 > 5 : no\n\nTree 2:\nx1 <= 3 : yes\nx1 > 3 : no\n\nTree 3:\n: no\n");
        let forest = Forest::build_from_inducer(&batch, &inducer, 3, 1, 0);
        assert_eq!(forest.n_trees(), 3);
        assert_eq!(forest.n_leaves(), 5);
        // the single leaf holds a 10/10 tie, resolved to the first class
        assert_eq!(forest.tree(2).leaf(0).unwrap().prediction, "yes");
        assert_eq!(forest.predict(&batch.records()[0]).unwrap(), "yes");
        // x1 = 4: yes, no, yes
        assert_eq!(forest.predict(&batch.records()[8]).unwrap(), "yes");
        // x1 = 9.5: no, no, yes
        assert_eq!(forest.predict(&batch.records()[19]).unwrap(), "no");
    }

    #[test]
    fn tied_vote_goes_to_first_class() {
        let batch = separable_batch(20, 0.0);
        let inducer = RuleText("Tree 1:\nx1 <= 5 : yes\nx1 > 5 : no\n\nTree 2:\n: no\n");
        let forest = Forest::build_from_inducer(&batch, &inducer, 2, 1, 0);
        // x1 = 9.5: `no` from the split tree, `yes` from the tied leaf
        assert_eq!(forest.predict(&batch.records()[19]).unwrap(), "yes");
    }

    #[test]
    fn failed_induction_falls_back_to_majority_leaves() {
        let batch = labelled_batch(&[(1.0, 0.0, "b"), (2.0, 0.0, "a"), (3.0, 0.0, "b")]);
        let forest = Forest::build_from_inducer(&batch, &Failing, 3, 1, 0);
        assert_eq!(forest.n_trees(), 3);
        assert!(forest.trees().iter().all(Tree::is_single_leaf));
        assert_eq!(forest.predict(&batch.records()[1]).unwrap(), "b");

        let broken = Forest::build_from_inducer(&batch, &RuleText("Tree 1:\nnope <= 1 : a\n"), 2, 1, 0);
        assert_eq!(broken.n_trees(), 2);
    }

    #[test]
    fn rule_set_round_trip_keeps_predictions() {
        let batch = separable_batch(30, 0.0);
        let forest = Forest::build_from_inducer(&batch, &HeuristicInducer::default(), 2, 1, 0);
        let text = forest.to_rule_set();
        let copy = Forest::from_rule_set(&text, &batch).unwrap();
        assert_eq!(copy.n_trees(), forest.n_trees());
        for record in batch.records() {
            assert_eq!(copy.predict(record).unwrap(), forest.predict(record).unwrap());
        }
        assert_eq!(copy.to_rule_set(), text);
    }

    #[test]
    fn unroutable_records_count_as_wrong() {
        let batch = separable_batch(20, 0.0);
        let forest = Forest::build_from_inducer(&batch, &HeuristicInducer::default(), 1, 1, 0);
        let schema = batch.schema().clone();
        let missing = BatchStats::from_rows(schema, [["?", "1", "yes"], ["1", "1", "yes"]]).unwrap();
        assert_eq!(forest.accuracy(&missing), 50.0);
        assert!(forest.predict(&missing.records()[0]).is_err());
    }

    #[test]
    fn empty_inputs() {
        let batch = separable_batch(20, 0.0);
        assert_eq!(Forest::new().predict(&batch.records()[0]), Err(RouteError::NoTrees));
        assert_eq!(Forest::new().accuracy(&batch), 0.0);
        let forest = Forest::build_from_inducer(&batch, &HeuristicInducer::default(), 1, 1, 0);
        assert_eq!(forest.accuracy(&separable_batch(0, 0.0)), 0.0);
    }

    #[test]
    fn vocabulary_only_grows() {
        let mut forest = Forest::from_trees(Vec::new(), vec!["a".into()]);
        assert_eq!(forest.extend_vocabulary(&["b".into(), "a".into()]), 1);
        assert_eq!(forest.extend_vocabulary(&["a".into()]), 0);
        assert_eq!(forest.vocabulary(), ["a", "b"]);
        assert_eq!(forest.count_new_classes(&["c".into(), "b".into()]), 1);

        forest.inherit_vocabulary(&["c".into(), "b".into()]);
        assert_eq!(forest.vocabulary(), ["c", "b", "a"]);
    }
}
