//! High-level adaptive forest model.
//!
//! [`ForestOrchestrator`] is the entry point: configure it with
//! [`AdfConfig`], feed it batches and read a [`BatchReport`] per batch.
//!
//! ```
//! use adaforest::model::{AdfConfig, ForestOrchestrator, ForestSlot};
//! use adaforest::induction::InducerKind;
//! use adaforest::testing::separable_batch;
//!
//! let config = AdfConfig::builder()
//!     .inducer(InducerKind::Heuristic)
//!     .min_leaf_size(1)
//!     .build()
//!     .unwrap();
//! let mut adf = ForestOrchestrator::new(config).unwrap();
//! let reports = adf
//!     .process_stream([("b1", separable_batch(20, 0.0)), ("b2", separable_batch(20, 0.0))])
//!     .unwrap();
//! assert_eq!(reports.len(), 2);
//! assert_eq!(reports[1].cdf, 0);
//! assert!(!adf.forest(ForestSlot::AF).is_empty());
//! ```

mod config;
mod orchestrator;
mod report;
mod window;

pub use config::{AdfConfig, AdfConfigBuilder, ConfigError};
pub use orchestrator::ForestOrchestrator;
pub use report::{BatchReport, ForestEval, ForestSlot, StatusTag};
pub use window::BatchWindow;
