//! Per-batch diagnostics.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// One of the three forests the orchestrator maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ForestSlot {
    /// Current forest.
    PF,
    /// Adapted forest.
    AF,
    /// Transient forest.
    TF,
}

impl ForestSlot {
    pub const ALL: [ForestSlot; 3] = [ForestSlot::PF, ForestSlot::AF, ForestSlot::TF];

    pub fn as_str(self) -> &'static str {
        match self {
            ForestSlot::PF => "PF",
            ForestSlot::AF => "AF",
            ForestSlot::TF => "TF",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            ForestSlot::PF => 0,
            ForestSlot::AF => 1,
            ForestSlot::TF => 2,
        }
    }
}

impl fmt::Display for ForestSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the forests while processing a batch, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusTag {
    /// First batch: PF built and AF parsed from its rule set.
    ForestsBuilt,
    /// ISAT ran on the forest.
    Repaired(ForestSlot),
    /// TF was empty and has been built from the window.
    TransientBuilt,
    /// TF could not be repaired and has been rebuilt from the window.
    TransientRebuilt,
    /// Concept drift persisted: AF replaced by TF.
    Promoted,
    /// Repair broke the forest's structure; it was induced again.
    Rebuilt(ForestSlot),
    /// Forest with the highest accuracy on the batch.
    Best(ForestSlot),
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTag::ForestsBuilt => f.write_str("(PFNE-BPF-CAF)"),
            StatusTag::Repaired(slot) => write!(f, "({}-isat)", slot),
            StatusTag::TransientBuilt => f.write_str("(TFNE-TFW)"),
            StatusTag::TransientRebuilt => f.write_str("(BTFW)"),
            StatusTag::Promoted => f.write_str("(CDF-AF=TF)"),
            StatusTag::Rebuilt(slot) => write!(f, "({}-rebuilt)", slot),
            StatusTag::Best(slot) => write!(f, "({})", slot),
        }
    }
}

/// Accuracy and elapsed time of one forest on one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ForestEval {
    /// Percentage of the batch's records predicted correctly; `None` when
    /// the forest was empty.
    pub accuracy: Option<f64>,
    /// Time spent building or repairing it; `None` when it was not touched.
    pub elapsed: Option<Duration>,
}

/// Diagnostics record of one processed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    /// Indexed by [`ForestSlot`].
    pub forests: [ForestEval; 3],
    pub best: ForestSlot,
    pub status: Vec<StatusTag>,
    /// Concept drift counter after the batch.
    pub cdf: usize,
    /// PF and TF time, plus AF time once a TF has ever been built.
    pub total_time: Duration,
}

impl BatchReport {
    #[inline]
    pub fn forest(&self, slot: ForestSlot) -> &ForestEval {
        &self.forests[slot.index()]
    }

    /// Accuracy of the best forest.
    pub fn best_accuracy(&self) -> f64 {
        self.forest(self.best).accuracy.unwrap_or(0.0)
    }

    pub fn has_status(&self, tag: StatusTag) -> bool {
        self.status.contains(&tag)
    }

    /// Status tags joined as one string, e.g. `(PF-isat)-(AF-isat)-(PF)`.
    pub fn status_line(&self) -> String {
        self.status.iter().map(ToString::to_string).collect::<Vec<_>>().join("-")
    }

    /// Per-forest columns of a diagnostics row:
    /// `PFAccuracy, PFTime, AFAccuracy, AFTime, TFAccuracy, TFTime, Status`.
    ///
    /// Times are in milliseconds, `-1` for a forest that was not touched.
    pub fn csv_columns(&self) -> String {
        let mut columns: Vec<String> = Vec::with_capacity(7);
        for slot in ForestSlot::ALL {
            let eval = self.forest(slot);
            columns.push(format!("{:.3}", eval.accuracy.unwrap_or(0.0)));
            columns.push(eval.elapsed.map_or_else(|| "-1".to_string(), |d| d.as_millis().to_string()));
        }
        columns.push(self.status_line());
        columns.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BatchReport {
        BatchReport {
            batch_id: "b1".to_string(),
            forests: [
                ForestEval {
                    accuracy: Some(90.0),
                    elapsed: Some(Duration::from_millis(12)),
                },
                ForestEval {
                    accuracy: Some(80.0),
                    elapsed: Some(Duration::from_millis(3)),
                },
                ForestEval::default(),
            ],
            best: ForestSlot::PF,
            status: vec![
                StatusTag::Repaired(ForestSlot::PF),
                StatusTag::Repaired(ForestSlot::AF),
                StatusTag::Best(ForestSlot::PF),
            ],
            cdf: 0,
            total_time: Duration::from_millis(12),
        }
    }

    #[test]
    fn status_line_joins_tags() {
        assert_eq!(report().status_line(), "(PF-isat)-(AF-isat)-(PF)");
        assert_eq!(StatusTag::Promoted.to_string(), "(CDF-AF=TF)");
        assert_eq!(StatusTag::Rebuilt(ForestSlot::TF).to_string(), "(TF-rebuilt)");
    }

    #[test]
    fn csv_columns_mark_untouched_forests() {
        assert_eq!(
            report().csv_columns(),
            "90.000, 12, 80.000, 3, 0.000, -1, (PF-isat)-(AF-isat)-(PF)"
        );
    }

    #[test]
    fn best_accuracy_reads_best_slot() {
        let r = report();
        assert_eq!(r.best_accuracy(), 90.0);
        assert!(r.has_status(StatusTag::Best(ForestSlot::PF)));
        assert!(!r.has_status(StatusTag::Promoted));
        assert_eq!(r.forest(ForestSlot::TF).accuracy, None);
    }
}
