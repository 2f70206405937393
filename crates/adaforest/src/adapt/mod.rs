//! Drift detection and structural repair of forests.
//!
//! A batch first goes through [`assess`], which flags the leaves whose
//! confidence it would degrade and decides whether the forest is still
//! repairable. [`StructuralRepairer`] then runs ISAT (incremental structural
//! adaptation of trees) on the forests the orchestrator chooses to repair:
//!
//! 1. graft new roots where the batch covers attribute ranges a tree has
//!    never seen,
//! 2. refresh every leaf's statistics,
//! 3. replace perturbed impure leaves by subtrees induced on their records.

mod drift;
mod isat;

pub use drift::{assess, identify_perturbed_leaves, RepairAssessment};
pub use isat::{RepairError, RepairOutcome, StructuralRepairer};

use crate::utils::Parallelism;

/// Knobs shared by drift assessment and repair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairParams {
    /// Confidence drop a leaf tolerates before it counts as perturbed.
    pub error_tolerance: f64,
    /// Largest perturbed-leaf ratio at which a forest is still repairable.
    pub repairable_threshold: f64,
    pub min_leaf_size: usize,
    /// Base seed; tree `i` uses `seed + i`.
    pub seed: u64,
    pub parallelism: Parallelism,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            error_tolerance: 0.01,
            repairable_threshold: 0.2,
            min_leaf_size: 100,
            seed: 42,
            parallelism: Parallelism::Sequential,
        }
    }
}
