//! Tree inducers.
//!
//! A [`TreeInducer`] turns a batch into an ensemble of decision trees, either
//! as ready [`Tree`]s or as rule-set text (see [`crate::compat::ruleset`]).
//! Forests accept both through [`Induction`].
//!
//! Three inducers ship with the crate, selected by [`InducerKind`]:
//!
//! - [`RandomForestInducer`]: bagged random trees
//! - [`HeuristicInducer`]: deterministic trees rooted on the best attributes
//! - [`HoeffdingInducer`]: online-bagged Hoeffding trees

mod heuristic;
mod hoeffding;
mod random;
pub(crate) mod split;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::compat::ruleset::{parse_rule_set, RuleSetError};
use crate::data::{BatchStats, Schema};
use crate::repr::{Tree, TreeValidationError};
use crate::utils::Parallelism;

pub use heuristic::HeuristicInducer;
pub use hoeffding::HoeffdingInducer;
pub use random::RandomForestInducer;

// =============================================================================
// Contract
// =============================================================================

/// Output of an inducer.
#[derive(Debug, Clone)]
pub enum Induction {
    /// Rule-set text, parsed against the batch schema by the caller.
    RuleSet(String),
    Trees(Vec<Tree>),
}

impl Induction {
    /// The induced trees; rule-set text is parsed against `schema`.
    pub fn into_trees(self, schema: &Schema) -> Result<Vec<Tree>, InductionError> {
        match self {
            Induction::Trees(trees) => Ok(trees),
            Induction::RuleSet(text) => Ok(parse_rule_set(&text, schema)?),
        }
    }
}

/// Error type for tree induction.
#[derive(Debug, thiserror::Error)]
pub enum InductionError {
    #[error("cannot induce trees from an empty batch")]
    EmptyBatch,
    #[error("batch has no attributes besides the class")]
    NoAttributes,
    #[error("unknown inducer `{0}` (expected RF, SysFor or HT)")]
    UnknownInducer(String),
    #[error("induced rule set is invalid: {0}")]
    RuleSet(#[from] RuleSetError),
    #[error("induced tree is invalid: {0}")]
    InvalidTree(#[from] TreeValidationError),
    #[error("sampling distribution: {0}")]
    Sampling(String),
}

/// Builds decision trees from a batch.
///
/// Implementations must be deterministic for a given `seed`; ensemble member
/// `i` draws its randomness from `seed + i`.
pub trait TreeInducer: Send + Sync {
    /// Short name used in reports.
    fn name(&self) -> &'static str;

    /// Induce up to `ensemble_size` trees whose leaves hold at least
    /// `min_leaf_size` records where possible.
    fn induce(
        &self,
        batch: &BatchStats,
        ensemble_size: usize,
        min_leaf_size: usize,
        seed: u64,
    ) -> Result<Induction, InductionError>;
}

/// Check the preconditions every shipped inducer shares.
pub(crate) fn check_batch(batch: &BatchStats) -> Result<(), InductionError> {
    if batch.is_empty() {
        return Err(InductionError::EmptyBatch);
    }
    if batch.schema().feature_indices().next().is_none() {
        return Err(InductionError::NoAttributes);
    }
    Ok(())
}

/// Minimum leaf weight as used by split search.
#[inline]
pub(crate) fn min_leaf_weight(min_leaf_size: usize) -> f64 {
    min_leaf_size.max(1) as f64
}

// =============================================================================
// InducerKind
// =============================================================================

/// The shipped inducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InducerKind {
    #[default]
    RandomForest,
    /// SysFor-style deterministic forest.
    Heuristic,
    Hoeffding,
}

impl InducerKind {
    /// Code used on the command line and in output file names.
    pub fn code(self) -> &'static str {
        match self {
            InducerKind::RandomForest => "RF",
            InducerKind::Heuristic => "SysFor",
            InducerKind::Hoeffding => "HT",
        }
    }

    pub fn inducer(self, parallelism: Parallelism) -> Box<dyn TreeInducer> {
        match self {
            InducerKind::RandomForest => Box::new(RandomForestInducer::new(parallelism)),
            InducerKind::Heuristic => Box::new(HeuristicInducer::new(parallelism)),
            InducerKind::Hoeffding => Box::new(HoeffdingInducer::new(parallelism)),
        }
    }
}

impl fmt::Display for InducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for InducerKind {
    type Err = InductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rf" | "randomforest" | "random_forest" => Ok(InducerKind::RandomForest),
            "sysfor" | "heuristic" => Ok(InducerKind::Heuristic),
            "ht" | "hoeffding" | "hoeffdingtree" => Ok(InducerKind::Hoeffding),
            _ => Err(InductionError::UnknownInducer(s.to_string())),
        }
    }
}
