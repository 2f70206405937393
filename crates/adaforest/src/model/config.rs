//! Configuration of the adaptive forest with builder pattern.
//!
//! [`AdfConfig`] gathers every knob of the orchestrator: which inducer grows
//! trees, how strict drift detection is, and how long concept drift may
//! persist before the transient forest takes over.
//!
//! # Example
//!
//! ```
//! use adaforest::induction::InducerKind;
//! use adaforest::model::AdfConfig;
//!
//! // All defaults
//! let config = AdfConfig::builder().build().unwrap();
//! assert_eq!(config.min_leaf_size, 100);
//!
//! let config = AdfConfig::builder()
//!     .inducer(InducerKind::Heuristic)
//!     .ensemble_size(10)
//!     .cdf_threshold(2)
//!     .build()
//!     .unwrap();
//! ```

use std::num::NonZeroUsize;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::adapt::RepairParams;
use crate::induction::InducerKind;
use crate::utils::Parallelism;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Ensemble size must be at least 1.
    InvalidEnsembleSize,
    /// Window must hold at least one batch.
    InvalidWindowThreshold,
    /// Promotion needs at least one unrepairable batch.
    InvalidCdfThreshold,
    /// Ratio outside [0, 1].
    InvalidRatio { field: &'static str, value: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEnsembleSize => write!(f, "ensemble_size must be at least 1"),
            Self::InvalidWindowThreshold => write!(f, "window_threshold must be at least 1"),
            Self::InvalidCdfThreshold => write!(f, "cdf_threshold must be at least 1"),
            Self::InvalidRatio { field, value } => {
                write!(f, "{} must be in [0, 1], got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// AdfConfig
// =============================================================================

/// Configuration of a [`ForestOrchestrator`](super::ForestOrchestrator).
///
/// # Structure
///
/// - **Induction**: inducer, ensemble size and minimum leaf size
/// - **Drift**: error tolerance and repairable threshold
/// - **Concept drift**: window size and promotion threshold
/// - **Resources**: threading and seeding
///
/// Deserializing fills absent fields with their defaults; the result should
/// still go through [`AdfConfig::validate`].
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
#[serde(default)]
pub struct AdfConfig {
    // === Induction ===
    /// Inducer for initial forests, transient forests and repair subtrees.
    /// Default: `RandomForest`.
    #[builder(default)]
    pub inducer: InducerKind,

    /// Number of trees to request from the inducer. Default: 1.
    #[builder(default = 1)]
    pub ensemble_size: usize,

    /// Minimum number of records per leaf. Default: 100.
    #[builder(default = 100)]
    pub min_leaf_size: usize,

    // === Drift detection ===
    /// Largest perturbed-leaf ratio at which a forest is repaired.
    /// Default: 0.2.
    #[builder(default = 0.2)]
    pub repairable_threshold: f64,

    /// Confidence drop a leaf tolerates before it is perturbed. Default: 0.01.
    #[builder(default = 0.01)]
    pub error_tolerance: f64,

    // === Concept drift ===
    /// Number of recent batches the transient forest is trained on.
    /// Default: 3.
    #[builder(default = 3)]
    pub window_threshold: usize,

    /// Consecutive unrepairable batches tolerated before the transient
    /// forest replaces the adapted one. Default: 3.
    #[builder(default = 3)]
    pub cdf_threshold: usize,

    /// Repair the current forest on every batch, repairable or not.
    /// Default: true.
    #[builder(default = true)]
    pub pf_always_update: bool,

    // === Data ===
    /// Class attribute position. `None` uses the last attribute.
    pub class_index: Option<usize>,

    // === Resources ===
    /// Random seed. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Number of threads. `None` uses all available cores.
    pub n_threads: Option<NonZeroUsize>,
}

/// Custom finishing function that validates the config.
impl<S: adf_config_builder::IsComplete> AdfConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is invalid:
    /// - `ensemble_size == 0`
    /// - `window_threshold == 0`
    /// - `cdf_threshold == 0`
    /// - `repairable_threshold` or `error_tolerance` outside [0, 1]
    pub fn build(self) -> Result<AdfConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl AdfConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ensemble_size == 0 {
            return Err(ConfigError::InvalidEnsembleSize);
        }
        if self.window_threshold == 0 {
            return Err(ConfigError::InvalidWindowThreshold);
        }
        if self.cdf_threshold == 0 {
            return Err(ConfigError::InvalidCdfThreshold);
        }
        for (field, value) in [
            ("repairable_threshold", self.repairable_threshold),
            ("error_tolerance", self.error_tolerance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRatio { field, value });
            }
        }
        Ok(())
    }

    /// Name of the method, e.g. `ADF-RF`.
    pub fn method_name(&self) -> String {
        format!("ADF-{}", self.inducer.code())
    }

    /// One-line model description, written at the top of diagnostics files.
    pub fn describe(&self) -> String {
        format!(
            "Base classifier: {}, Ensemble size: {}, Min leaf size: {}, Repairable threshold: {}, \
             Error tolerance threshold: {}, SCD threshold: {}, Window threshold: {}",
            self.method_name(),
            self.ensemble_size,
            self.min_leaf_size,
            self.repairable_threshold,
            self.error_tolerance,
            self.cdf_threshold,
            self.window_threshold,
        )
    }

    /// Thread count in [`run_with_threads`](crate::utils::run_with_threads)
    /// semantics (0 = all cores).
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.n_threads.map_or(0, NonZeroUsize::get)
    }

    pub fn repair_params(&self, parallelism: Parallelism) -> RepairParams {
        RepairParams {
            error_tolerance: self.error_tolerance,
            repairable_threshold: self.repairable_threshold,
            min_leaf_size: self.min_leaf_size,
            seed: self.seed,
            parallelism,
        }
    }
}

impl Default for AdfConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Tests
// =============================================================================
