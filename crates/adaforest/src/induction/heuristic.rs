//! Deterministic forest rooted on the best attributes (SysFor style).

use tracing::debug;

use crate::data::BatchStats;
use crate::utils::Parallelism;

use super::split::{grow_tree, Candidate, Criterion, NumericOps, SplitContext, MIN_GAIN};
use super::{check_batch, min_leaf_weight, Induction, InductionError, TreeInducer};

/// Tree `i` is rooted on the attribute with the `i`-th best gain ratio over
/// the whole batch; lower levels are grown greedily by gain ratio. When fewer
/// attributes carry information than trees are requested, fewer trees are
/// returned. A batch with no informative attribute yields no tree, leaving
/// the fallback to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInducer {
    parallelism: Parallelism,
}

impl HeuristicInducer {
    pub fn new(parallelism: Parallelism) -> Self {
        Self { parallelism }
    }
}

impl TreeInducer for HeuristicInducer {
    fn name(&self) -> &'static str {
        "SysFor"
    }

    fn induce(
        &self,
        batch: &BatchStats,
        ensemble_size: usize,
        min_leaf_size: usize,
        _seed: u64,
    ) -> Result<Induction, InductionError> {
        check_batch(batch)?;
        let ctx = SplitContext::new(batch);
        let min_leaf = min_leaf_weight(min_leaf_size);
        let rows: Vec<usize> = (0..batch.n_records()).collect();
        let weights = vec![1.0; rows.len()];

        let mut roots: Vec<Candidate> = ctx
            .features
            .iter()
            .filter_map(|&a| ctx.candidate(a, &rows, &weights, min_leaf))
            .filter(|c| c.gain > MIN_GAIN)
            .collect();
        // stable: equal ratios keep attribute order
        roots.sort_by(|a, b| b.gain_ratio.total_cmp(&a.gain_ratio));
        roots.truncate(ensemble_size);
        debug!(n_roots = roots.len(), ensemble_size, "ranked root attributes");

        if roots.is_empty() || 2.0 * min_leaf > rows.len() as f64 {
            return Ok(Induction::Trees(Vec::new()));
        }

        let trees = self.parallelism.maybe_par_map(roots, |root| {
            let mut first = Some(root);
            grow_tree(
                &ctx,
                rows.clone(),
                weights.clone(),
                min_leaf,
                NumericOps::INCLUSIVE,
                &mut |r, w, _| {
                    first
                        .take()
                        .or_else(|| ctx.best_split(ctx.features.iter().copied(), r, w, min_leaf, Criterion::GainRatio))
                },
            )
        });
        Ok(Induction::Trees(trees.into_iter().collect::<Result<Vec<_>, _>>()?))
    }
}
