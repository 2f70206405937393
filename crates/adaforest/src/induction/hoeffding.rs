//! Online-bagged Hoeffding trees.
//!
//! Each ensemble member sees the batch as a stream in which every record is
//! repeated `k ~ Poisson(6)` times. A leaf keeps the rows it received and,
//! every `grace` units of weight, evaluates all attributes on them; it splits
//! once the best gain beats the runner-up by the Hoeffding bound, or when the
//! bound falls below the tie threshold.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

use crate::data::BatchStats;
use crate::repr::{NodeId, Tree, TreeBuilder};
use crate::utils::Parallelism;

use super::split::{Candidate, NumericOps, SplitContext, MAX_DEPTH, MIN_GAIN};
use super::{check_batch, min_leaf_weight, Induction, InductionError, TreeInducer};

/// Poisson rate of online bagging.
const BAGGING_RATE: f64 = 6.0;
/// Probability of choosing the wrong split.
const SPLIT_CONFIDENCE: f64 = 1e-7;
const TIE_THRESHOLD: f64 = 0.05;

const OPS: NumericOps = NumericOps::INCLUSIVE;

#[derive(Debug, Clone, Copy, Default)]
pub struct HoeffdingInducer {
    parallelism: Parallelism,
}

impl HoeffdingInducer {
    pub fn new(parallelism: Parallelism) -> Self {
        Self { parallelism }
    }
}

impl TreeInducer for HoeffdingInducer {
    fn name(&self) -> &'static str {
        "HT"
    }

    fn induce(
        &self,
        batch: &BatchStats,
        ensemble_size: usize,
        min_leaf_size: usize,
        seed: u64,
    ) -> Result<Induction, InductionError> {
        check_batch(batch)?;
        let poisson = Poisson::new(BAGGING_RATE).map_err(|e| InductionError::Sampling(e.to_string()))?;
        let ctx = SplitContext::new(batch);
        let grace = min_leaf_weight(min_leaf_size);
        let all: Vec<usize> = (0..batch.n_records()).collect();
        let fallback = ctx.majority(&ctx.class_counts(&all, &vec![1.0; all.len()])).unwrap_or(0);

        let trees = self.parallelism.maybe_par_map(0..ensemble_size, |i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut tree = HoeffdingTree::new(&ctx, grace);
            for row in 0..batch.n_records() {
                let k: f64 = poisson.sample(&mut rng);
                if k > 0.0 {
                    tree.learn(row, k);
                }
            }
            tree.into_tree(fallback)
        });
        Ok(Induction::Trees(trees.into_iter().collect::<Result<Vec<_>, _>>()?))
    }
}

// =============================================================================
// HoeffdingTree
// =============================================================================

#[derive(Debug)]
enum HNode {
    Leaf {
        rows: Vec<usize>,
        weights: Vec<f64>,
        since_check: f64,
        depth: u32,
    },
    Split {
        candidate: Candidate,
        children: Vec<usize>,
    },
}

impl HNode {
    fn leaf(rows: Vec<usize>, weights: Vec<f64>, depth: u32) -> Self {
        HNode::Leaf {
            rows,
            weights,
            since_check: 0.0,
            depth,
        }
    }
}

#[derive(Debug)]
struct HoeffdingTree<'c, 'a> {
    ctx: &'c SplitContext<'a>,
    nodes: Vec<HNode>,
    /// Weight between split attempts; also the minimum branch weight.
    grace: f64,
}

impl<'c, 'a> HoeffdingTree<'c, 'a> {
    fn new(ctx: &'c SplitContext<'a>, grace: f64) -> Self {
        Self {
            ctx,
            nodes: vec![HNode::leaf(Vec::new(), Vec::new(), 0)],
            grace,
        }
    }

    fn learn(&mut self, row: usize, weight: f64) {
        let mut id = 0;
        while let HNode::Split { candidate, children } = &self.nodes[id] {
            match self.ctx.branch_of(candidate, row, OPS) {
                Some(b) => id = children[b],
                None => return,
            }
        }
        let HNode::Leaf {
            rows,
            weights,
            since_check,
            ..
        } = &mut self.nodes[id]
        else {
            return;
        };
        rows.push(row);
        weights.push(weight);
        *since_check += weight;
        if *since_check >= self.grace {
            *since_check = 0.0;
            self.attempt_split(id);
        }
    }

    fn attempt_split(&mut self, id: usize) {
        let HNode::Leaf {
            rows, weights, depth, ..
        } = &self.nodes[id]
        else {
            return;
        };
        if *depth >= MAX_DEPTH {
            return;
        }
        let counts = self.ctx.class_counts(rows, weights);
        if counts.iter().filter(|&&c| c > 0.0).count() < 2 {
            return;
        }
        let n: f64 = counts.iter().sum();

        let mut candidates: Vec<Candidate> = self
            .ctx
            .features
            .iter()
            .filter_map(|&a| self.ctx.candidate(a, rows, weights, self.grace))
            .collect();
        candidates.sort_by(|a, b| b.gain.total_cmp(&a.gain));
        let Some(best) = candidates.first() else {
            return;
        };
        if best.gain <= MIN_GAIN {
            return;
        }
        let runner_up = candidates.get(1).map_or(0.0, |c| c.gain.max(0.0));
        let range = (self.ctx.n_classes() as f64).log2().max(1.0);
        let bound = (range * range * (1.0 / SPLIT_CONFIDENCE).ln() / (2.0 * n)).sqrt();
        if best.gain - runner_up <= bound && bound >= TIE_THRESHOLD {
            return;
        }

        let best = best.clone();
        let child_depth = depth + 1;
        let parts = self.ctx.partition(&best, rows, weights, OPS);
        let mut children = Vec::with_capacity(parts.len());
        for (r, w) in parts {
            children.push(self.nodes.len());
            self.nodes.push(HNode::leaf(r, w, child_depth));
        }
        self.nodes[id] = HNode::Split {
            candidate: best,
            children,
        };
    }

    /// Freeze into an arena tree. Leaves predict the weighted majority of
    /// their rows, or their parent's when they received none.
    fn into_tree(self, fallback: usize) -> Result<Tree, InductionError> {
        let mut builder = TreeBuilder::new();
        let root = builder.init_root();
        let mut stack: Vec<(usize, NodeId, usize)> = vec![(0, root, fallback)];
        while let Some((h, node, fallback)) = stack.pop() {
            match &self.nodes[h] {
                HNode::Leaf { rows, weights, .. } => {
                    let majority = self.ctx.majority(&self.ctx.class_counts(rows, weights)).unwrap_or(fallback);
                    builder.make_leaf(node, self.ctx.class_name(majority));
                }
                HNode::Split { candidate, children } => {
                    let majority = self.majority_below(h).unwrap_or(fallback);
                    let ids = builder.split(
                        node,
                        self.ctx.split_attribute(candidate.attribute),
                        self.ctx.conditions(candidate, OPS),
                    );
                    for (&child, id) in children.iter().zip(ids) {
                        stack.push((child, id, majority));
                    }
                }
            }
        }
        Ok(builder.finish()?)
    }

    /// Majority class over all rows held below `h`.
    fn majority_below(&self, h: usize) -> Option<usize> {
        let mut counts = vec![0.0; self.ctx.n_classes()];
        let mut stack = vec![h];
        while let Some(id) = stack.pop() {
            match &self.nodes[id] {
                HNode::Leaf { rows, weights, .. } => {
                    for (t, c) in counts.iter_mut().zip(self.ctx.class_counts(rows, weights)) {
                        *t += c;
                    }
                }
                HNode::Split { children, .. } => stack.extend(children.iter().copied()),
            }
        }
        self.ctx.majority(&counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::separable_batch;

    fn trees(induction: Induction) -> Vec<Tree> {
        match induction {
            Induction::Trees(trees) => trees,
            Induction::RuleSet(_) => panic!("expected trees"),
        }
    }

    #[test]
    fn learns_separable_stream() {
        let batch = separable_batch(400, 0.0);
        let trees = trees(HoeffdingInducer::default().induce(&batch, 2, 10, 3).unwrap());
        assert_eq!(trees.len(), 2);
        for tree in &trees {
            tree.validate().unwrap();
            assert!(!tree.is_single_leaf());
            assert_eq!(tree.predict(&batch.records()[0]).unwrap(), "yes");
            assert_eq!(tree.predict(&batch.records()[399]).unwrap(), "no");
        }
    }

    #[test]
    fn pure_stream_never_splits() {
        let batch = separable_batch(100, 0.0).select(|r| r.numeric(0).is_some_and(|v| v < 5.0));
        let trees = trees(HoeffdingInducer::default().induce(&batch, 1, 5, 0).unwrap());
        assert!(trees[0].is_single_leaf());
        assert_eq!(trees[0].predict(&batch.records()[0]).unwrap(), "yes");
    }

    #[test]
    fn deterministic_for_seed() {
        let batch = separable_batch(200, 0.0);
        let a = trees(HoeffdingInducer::new(Parallelism::Sequential).induce(&batch, 3, 10, 5).unwrap());
        let b = trees(HoeffdingInducer::new(Parallelism::Parallel).induce(&batch, 3, 10, 5).unwrap());
        assert_eq!(a, b);
    }
}
