//! Bagged random trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::BatchStats;
use crate::utils::Parallelism;

use super::split::{grow_tree, Criterion, NumericOps, SplitContext};
use super::{check_batch, min_leaf_weight, Induction, InductionError, TreeInducer};

/// Random forest: every tree grows on a bootstrap sample, and every node
/// picks its split among `floor(log2(m)) + 1` randomly drawn attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomForestInducer {
    parallelism: Parallelism,
}

impl RandomForestInducer {
    pub fn new(parallelism: Parallelism) -> Self {
        Self { parallelism }
    }
}

/// Attributes drawn per node out of `m`.
fn subset_size(m: usize) -> usize {
    if m == 0 {
        return 0;
    }
    ((m as f64).log2().floor() as usize + 1).min(m)
}

impl TreeInducer for RandomForestInducer {
    fn name(&self) -> &'static str {
        "RF"
    }

    fn induce(
        &self,
        batch: &BatchStats,
        ensemble_size: usize,
        min_leaf_size: usize,
        seed: u64,
    ) -> Result<Induction, InductionError> {
        check_batch(batch)?;
        let ctx = SplitContext::new(batch);
        let n = batch.n_records();
        let m = ctx.features.len();
        let k = subset_size(m);
        let min_leaf = min_leaf_weight(min_leaf_size);

        let trees = self.parallelism.maybe_par_map(0..ensemble_size, |i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            rows.sort_unstable();
            let weights = vec![1.0; n];
            grow_tree(&ctx, rows, weights, min_leaf, NumericOps::STRICT, &mut |rows, weights, _| {
                let mut picked = rand::seq::index::sample(&mut rng, m, k).into_vec();
                picked.sort_unstable();
                ctx.best_split(picked.into_iter().map(|p| ctx.features[p]), rows, weights, min_leaf, Criterion::Gain)
            })
        });
        Ok(Induction::Trees(trees.into_iter().collect::<Result<Vec<_>, _>>()?))
    }
}
