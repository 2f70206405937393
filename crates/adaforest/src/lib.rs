//! adaforest: adaptive decision forests for batch data with concept drift.
//!
//! Three forests are kept over a sequence of batches: a current forest that
//! is repaired on every batch, an adapted forest repaired only while the data
//! still fits it, and a transient forest trained on recent batches that takes
//! over once drift persists. Repair is structural (ISAT): new roots are
//! grafted where a batch covers unseen attribute ranges, leaf statistics are
//! refreshed, and perturbed impure leaves are replaced by induced subtrees.
//!
//! # Key Types
//!
//! - [`ForestOrchestrator`] - per-batch control of the three forests
//! - [`AdfConfig`] - configuration builder
//! - [`Forest`] / [`Tree`] - decision forest representation
//! - [`BatchStats`] - an ingested batch and its statistics
//! - [`StructuralRepairer`] - ISAT repair of a single forest
//!
//! # Data
//!
//! Batches are read from ARFF files through [`data::ArffStream`]. Forests are
//! exchanged as rule-set text, see [`compat::ruleset`].

pub mod adapt;
pub mod compat;
pub mod data;
pub mod induction;
pub mod model;
pub mod repr;
pub mod testing;
pub mod utils;

mod error;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use error::{AdfError, Stage};

// High-level model types
pub use model::{AdfConfig, BatchReport, ForestOrchestrator, ForestSlot, StatusTag};

// Repair
pub use adapt::{RepairAssessment, RepairOutcome, StructuralRepairer};

// Representation and data
pub use data::{BatchStats, Record, Schema};
pub use induction::{InducerKind, TreeInducer};
pub use repr::{Forest, Tree};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
