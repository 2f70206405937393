//! Split search shared by the inducers.
//!
//! Rows are addressed by their position in the batch and carry a weight
//! (bootstrap repetitions are plain repeated rows with weight 1, online
//! bagging uses Poisson weights). Records with a missing value on the tested
//! attribute take no part in that attribute's split and are dropped from its
//! children, since routing cannot send them anywhere.

use crate::data::BatchStats;
use crate::repr::{NodeId, SplitAttribute, SplitCondition, SplitOp, Tree, TreeBuilder};

use super::InductionError;

/// Depth at which growth stops regardless of purity.
pub(crate) const MAX_DEPTH: u32 = 32;

/// Gains below this are treated as zero.
pub(crate) const MIN_GAIN: f64 = 1e-10;

/// Entropy in bits of (weighted) class counts. Zero for an empty input.
pub(crate) fn entropy(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / total;
            -p * p.log2()
        })
        .sum()
}

// =============================================================================
// Candidates
// =============================================================================

/// Test a candidate split applies.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Test {
    /// Numeric split at a midpoint.
    Threshold(f64),
    /// Multiway split, one branch per category.
    Categories(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub attribute: usize,
    pub test: Test,
    /// Information gain, scaled by the fraction of rows with a known value.
    pub gain: f64,
    pub gain_ratio: f64,
}

/// Score used to rank candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Criterion {
    Gain,
    GainRatio,
}

impl Criterion {
    fn score(self, c: &Candidate) -> f64 {
        match self {
            Criterion::Gain => c.gain,
            Criterion::GainRatio => c.gain_ratio,
        }
    }
}

/// Operators used for the two branches of a numeric split.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NumericOps {
    pub low: SplitOp,
    pub high: SplitOp,
}

impl NumericOps {
    /// `<` / `>=`
    pub const STRICT: Self = Self {
        low: SplitOp::Lt,
        high: SplitOp::Ge,
    };
    /// `<=` / `>`
    pub const INCLUSIVE: Self = Self {
        low: SplitOp::Le,
        high: SplitOp::Gt,
    };
}

// =============================================================================
// SplitContext
// =============================================================================

/// Per-batch lookup tables for split search.
#[derive(Debug)]
pub(crate) struct SplitContext<'a> {
    pub batch: &'a BatchStats,
    /// Class position of every record in the batch vocabulary.
    classes: Vec<Option<usize>>,
    /// Non-class attribute indices.
    pub features: Vec<usize>,
    /// Category lists per attribute: the declared domain extended by values
    /// seen in the batch. Empty for numeric attributes.
    domains: Vec<Vec<String>>,
}

impl<'a> SplitContext<'a> {
    pub fn new(batch: &'a BatchStats) -> Self {
        let schema = batch.schema();
        let vocabulary = batch.class_values();
        let classes = batch
            .records()
            .iter()
            .map(|r| batch.label(r).and_then(|l| vocabulary.iter().position(|v| v == l)))
            .collect();
        let features: Vec<usize> = schema.feature_indices().collect();

        let mut domains = vec![Vec::new(); schema.n_attributes()];
        for &a in &features {
            if schema.is_numeric(a) {
                continue;
            }
            let mut domain = schema.attribute(a).domain().to_vec();
            for record in batch.records() {
                if let Some(v) = record.value(a).as_str() {
                    if !domain.iter().any(|d| d == v) {
                        domain.push(v.to_string());
                    }
                }
            }
            domains[a] = domain;
        }

        Self {
            batch,
            classes,
            features,
            domains,
        }
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.batch.n_classes()
    }

    #[inline]
    pub fn class_name(&self, class: usize) -> &str {
        &self.batch.class_values()[class]
    }

    pub fn split_attribute(&self, attribute: usize) -> SplitAttribute {
        let schema = self.batch.schema();
        SplitAttribute {
            index: attribute,
            name: schema.attribute(attribute).name().to_string(),
            numeric: schema.is_numeric(attribute),
        }
    }

    pub fn class_counts(&self, rows: &[usize], weights: &[f64]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes()];
        for (&r, &w) in rows.iter().zip(weights) {
            if let Some(c) = self.classes[r] {
                counts[c] += w;
            }
        }
        counts
    }

    /// Best candidate for one attribute, or `None` when no split leaves at
    /// least two branches of `min_leaf` weight.
    pub fn candidate(&self, attribute: usize, rows: &[usize], weights: &[f64], min_leaf: f64) -> Option<Candidate> {
        if self.batch.schema().is_numeric(attribute) {
            self.numeric_candidate(attribute, rows, weights, min_leaf)
        } else {
            self.categorical_candidate(attribute, rows, weights, min_leaf)
        }
    }

    /// Highest scoring candidate with positive gain among `attributes`.
    /// Ties keep the attribute seen first.
    pub fn best_split(
        &self,
        attributes: impl IntoIterator<Item = usize>,
        rows: &[usize],
        weights: &[f64],
        min_leaf: f64,
        criterion: Criterion,
    ) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for a in attributes {
            let Some(c) = self.candidate(a, rows, weights, min_leaf) else {
                continue;
            };
            if c.gain <= MIN_GAIN {
                continue;
            }
            if best.as_ref().map_or(true, |b| criterion.score(&c) > criterion.score(b)) {
                best = Some(c);
            }
        }
        best
    }

    fn numeric_candidate(&self, attribute: usize, rows: &[usize], weights: &[f64], min_leaf: f64) -> Option<Candidate> {
        let records = self.batch.records();
        let mut items: Vec<(f64, usize, f64)> = rows
            .iter()
            .zip(weights)
            .filter_map(|(&r, &w)| Some((records[r].numeric(attribute)?, self.classes[r]?, w)))
            .collect();
        if items.len() < 2 {
            return None;
        }
        items.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut total = vec![0.0; self.n_classes()];
        for &(_, c, w) in &items {
            total[c] += w;
        }
        let known: f64 = total.iter().sum();
        let parent = entropy(&total);

        let mut left = vec![0.0; total.len()];
        let mut right = total.clone();
        let mut left_weight = 0.0;
        // (gain, threshold, left weight)
        let mut best: Option<(f64, f64, f64)> = None;
        for i in 0..items.len() - 1 {
            let (v, c, w) = items[i];
            left[c] += w;
            right[c] -= w;
            left_weight += w;
            let next = items[i + 1].0;
            if v == next {
                continue;
            }
            let right_weight = known - left_weight;
            if left_weight < min_leaf || right_weight < min_leaf {
                continue;
            }
            let children = (left_weight * entropy(&left) + right_weight * entropy(&right)) / known;
            let gain = parent - children;
            if best.map_or(true, |(g, _, _)| gain > g) {
                best = Some((gain, v + (next - v) / 2.0, left_weight));
            }
        }

        let (gain, threshold, left_weight) = best?;
        let fraction = known / weights.iter().sum::<f64>();
        let gain = gain * fraction;
        let split_info = entropy(&[left_weight, known - left_weight]);
        Some(Candidate {
            attribute,
            test: Test::Threshold(threshold),
            gain,
            gain_ratio: if split_info > 0.0 { gain / split_info } else { 0.0 },
        })
    }

    fn categorical_candidate(
        &self,
        attribute: usize,
        rows: &[usize],
        weights: &[f64],
        min_leaf: f64,
    ) -> Option<Candidate> {
        let domain = &self.domains[attribute];
        let records = self.batch.records();
        let mut counts = vec![vec![0.0; self.n_classes()]; domain.len()];
        for (&r, &w) in rows.iter().zip(weights) {
            let (Some(value), Some(c)) = (records[r].value(attribute).as_str(), self.classes[r]) else {
                continue;
            };
            if let Some(b) = domain.iter().position(|d| d == value) {
                counts[b][c] += w;
            }
        }

        let sizes: Vec<f64> = counts.iter().map(|c| c.iter().sum()).collect();
        if sizes.iter().filter(|&&s| s >= min_leaf && s > 0.0).count() < 2 {
            return None;
        }
        let known: f64 = sizes.iter().sum();
        let mut total = vec![0.0; self.n_classes()];
        for branch in &counts {
            for (t, c) in total.iter_mut().zip(branch) {
                *t += c;
            }
        }
        let children: f64 = counts
            .iter()
            .zip(&sizes)
            .map(|(branch, &size)| size * entropy(branch))
            .sum::<f64>()
            / known;
        let fraction = known / weights.iter().sum::<f64>();
        let gain = (entropy(&total) - children) * fraction;
        let split_info = entropy(&sizes);
        Some(Candidate {
            attribute,
            test: Test::Categories(domain.clone()),
            gain,
            gain_ratio: if split_info > 0.0 { gain / split_info } else { 0.0 },
        })
    }

    /// Branch conditions of a candidate, in child order.
    pub fn conditions(&self, candidate: &Candidate, ops: NumericOps) -> Vec<SplitCondition> {
        match &candidate.test {
            Test::Threshold(t) => vec![
                SplitCondition::numeric(ops.low, *t),
                SplitCondition::numeric(ops.high, *t),
            ],
            Test::Categories(values) => values.iter().map(SplitCondition::category).collect(),
        }
    }

    /// Branch index a row takes under `candidate`, `None` if its value is
    /// missing or unknown.
    pub fn branch_of(&self, candidate: &Candidate, row: usize, ops: NumericOps) -> Option<usize> {
        let value = self.batch.records()[row].value(candidate.attribute);
        match &candidate.test {
            Test::Threshold(t) => {
                let v = value.as_f64()?;
                Some(if ops.low.compare(v, *t) { 0 } else { 1 })
            }
            Test::Categories(values) => {
                let v = value.as_str()?;
                values.iter().position(|c| c == v)
            }
        }
    }

    /// Split rows and weights across the candidate's branches.
    pub fn partition(
        &self,
        candidate: &Candidate,
        rows: &[usize],
        weights: &[f64],
        ops: NumericOps,
    ) -> Vec<(Vec<usize>, Vec<f64>)> {
        let n_branches = match &candidate.test {
            Test::Threshold(_) => 2,
            Test::Categories(values) => values.len(),
        };
        let mut parts = vec![(Vec::new(), Vec::new()); n_branches];
        for (&r, &w) in rows.iter().zip(weights) {
            if let Some(b) = self.branch_of(candidate, r, ops) {
                parts[b].0.push(r);
                parts[b].1.push(w);
            }
        }
        parts
    }

    /// Majority class of weighted counts; ties to the lowest index, `None`
    /// when all counts are zero.
    pub fn majority(&self, counts: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &c) in counts.iter().enumerate() {
            if c > 0.0 && best.map_or(true, |(_, b)| c > b) {
                best = Some((i, c));
            }
        }
        best.map(|(i, _)| i)
    }
}

// =============================================================================
// Top-down growth
// =============================================================================

/// Grow a tree top-down from `rows`.
///
/// A node becomes a leaf when it is pure, holds less than `2 * min_leaf`
/// weight, reaches [`MAX_DEPTH`] or `choose` finds no split. Empty branches
/// predict their parent's majority class.
pub(crate) fn grow_tree(
    ctx: &SplitContext<'_>,
    rows: Vec<usize>,
    weights: Vec<f64>,
    min_leaf: f64,
    ops: NumericOps,
    choose: &mut dyn FnMut(&[usize], &[f64], u32) -> Option<Candidate>,
) -> Result<Tree, InductionError> {
    let mut builder = TreeBuilder::new();
    let root = builder.init_root();
    let mut stack: Vec<(NodeId, Vec<usize>, Vec<f64>, usize)> = vec![(root, rows, weights, 0)];

    while let Some((node, rows, weights, fallback)) = stack.pop() {
        let counts = ctx.class_counts(&rows, &weights);
        let majority = ctx.majority(&counts).unwrap_or(fallback);
        let n: f64 = counts.iter().sum();
        let pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;
        let depth = builder.depth(node);

        let candidate = if pure || n < 2.0 * min_leaf || depth >= MAX_DEPTH {
            None
        } else {
            choose(&rows, &weights, depth)
        };
        match candidate {
            None => builder.make_leaf(node, ctx.class_name(majority)),
            Some(c) => {
                let parts = ctx.partition(&c, &rows, &weights, ops);
                let children = builder.split(node, ctx.split_attribute(c.attribute), ctx.conditions(&c, ops));
                for (child, (r, w)) in children.into_iter().zip(parts) {
                    stack.push((child, r, w, majority));
                }
            }
        }
    }

    Ok(builder.finish()?)
}
