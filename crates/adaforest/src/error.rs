//! Crate-level error type.

use std::fmt;
use std::io;

use crate::adapt::RepairError;
use crate::compat::RuleSetError;
use crate::data::DataError;
use crate::induction::InductionError;
use crate::model::{ConfigError, ForestSlot};
use crate::repr::{ForestValidationError, RouteError, TreeValidationError};

/// Step of batch processing an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Repair,
    /// Merging the window into the transient forest's training batch.
    Consolidate,
    /// Parsing rule-set text into a new adapted forest.
    Parse,
    Evaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Build => "build",
            Stage::Repair => "repair",
            Stage::Consolidate => "consolidate",
            Stage::Parse => "parse",
            Stage::Evaluate => "evaluate",
        })
    }
}

/// Any error the adaptive forest can report.
#[derive(Debug, thiserror::Error)]
pub enum AdfError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    RuleSet(#[from] RuleSetError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    TreeValidation(#[from] TreeValidationError),

    #[error(transparent)]
    ForestValidation(#[from] ForestValidationError),

    #[error(transparent)]
    Induction(#[from] InductionError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repair(#[from] RepairError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch `{batch_id}`: {stage} of {forest} failed: {source}")]
    Batch {
        batch_id: String,
        forest: ForestSlot,
        stage: Stage,
        #[source]
        source: Box<AdfError>,
    },
}

impl AdfError {
    /// Attach batch context.
    pub fn in_batch(self, batch_id: &str, forest: ForestSlot, stage: Stage) -> Self {
        AdfError::Batch {
            batch_id: batch_id.to_string(),
            forest,
            stage,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_context_wraps_source() {
        let err = AdfError::from(DataError::EmptyBatch).in_batch("b3.arff", ForestSlot::TF, Stage::Consolidate);
        assert_eq!(err.to_string(), "batch `b3.arff`: consolidate of TF failed: batch has no records");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("batch has no records"));
    }

    #[test]
    fn config_errors_convert() {
        let err: AdfError = ConfigError::InvalidEnsembleSize.into();
        assert_eq!(err.to_string(), "invalid configuration: ensemble_size must be at least 1");
    }
}
