//! Per-batch control of the current, adapted and transient forests.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::adapt::StructuralRepairer;
use crate::data::BatchStats;
use crate::error::{AdfError, Stage};
use crate::induction::TreeInducer;
use crate::repr::Forest;
use crate::utils::Parallelism;

use super::config::{AdfConfig, ConfigError};
use super::report::{BatchReport, ForestEval, ForestSlot, StatusTag};
use super::window::BatchWindow;

// =============================================================================
// State
// =============================================================================

/// Everything a batch may change.
#[derive(Debug)]
struct ForestState {
    pf: Forest,
    af: Forest,
    tf: Forest,
    window: BatchWindow,
    /// Consecutive batches the adapted forest could not be repaired on.
    cdf: usize,
    tf_ever_built: bool,
    best: ForestSlot,
}

impl ForestState {
    fn new(window_threshold: usize) -> Self {
        Self {
            pf: Forest::new(),
            af: Forest::new(),
            tf: Forest::new(),
            window: BatchWindow::new(window_threshold),
            cdf: 0,
            tf_ever_built: false,
            best: ForestSlot::PF,
        }
    }

    fn forest(&self, slot: ForestSlot) -> &Forest {
        match slot {
            ForestSlot::PF => &self.pf,
            ForestSlot::AF => &self.af,
            ForestSlot::TF => &self.tf,
        }
    }

    /// Working copy for one batch. Forests are copied on first mutation;
    /// the window shares its batches.
    fn stage(&self) -> StagedState<'_> {
        StagedState {
            pf: Cow::Borrowed(&self.pf),
            af: Cow::Borrowed(&self.af),
            tf: Cow::Borrowed(&self.tf),
            window: self.window.clone(),
            cdf: self.cdf,
            tf_ever_built: self.tf_ever_built,
            best: self.best,
        }
    }

    /// Take over a staged batch that succeeded.
    fn commit(&mut self, changes: CommittedState) {
        for (slot, forest) in ForestSlot::ALL.into_iter().zip(changes.forests) {
            if let Some(forest) = forest {
                match slot {
                    ForestSlot::PF => self.pf = forest,
                    ForestSlot::AF => self.af = forest,
                    ForestSlot::TF => self.tf = forest,
                }
            }
        }
        self.window = changes.window;
        self.cdf = changes.cdf;
        self.tf_ever_built = changes.tf_ever_built;
        self.best = changes.best;
    }
}

/// [`ForestState`] as seen while a batch is processed.
struct StagedState<'s> {
    pf: Cow<'s, Forest>,
    af: Cow<'s, Forest>,
    tf: Cow<'s, Forest>,
    window: BatchWindow,
    cdf: usize,
    tf_ever_built: bool,
    best: ForestSlot,
}

impl StagedState<'_> {
    fn forest(&self, slot: ForestSlot) -> &Forest {
        match slot {
            ForestSlot::PF => &self.pf,
            ForestSlot::AF => &self.af,
            ForestSlot::TF => &self.tf,
        }
    }

    /// Detach from the committed state, keeping only modified forests.
    fn into_changes(self) -> CommittedState {
        CommittedState {
            forests: [modified(self.pf), modified(self.af), modified(self.tf)],
            window: self.window,
            cdf: self.cdf,
            tf_ever_built: self.tf_ever_built,
            best: self.best,
        }
    }
}

fn modified(forest: Cow<'_, Forest>) -> Option<Forest> {
    match forest {
        Cow::Owned(forest) => Some(forest),
        Cow::Borrowed(_) => None,
    }
}

/// Outcome of a successful batch, indexed like [`ForestSlot::ALL`].
struct CommittedState {
    forests: [Option<Forest>; 3],
    window: BatchWindow,
    cdf: usize,
    tf_ever_built: bool,
    best: ForestSlot,
}

/// Bookkeeping of the batch being processed.
struct BatchStep<'b> {
    batch_id: &'b str,
    status: Vec<StatusTag>,
    elapsed: [Option<Duration>; 3],
}

impl BatchStep<'_> {
    /// Run `f` and add its wall time to `slot`.
    fn timed<T>(&mut self, slot: ForestSlot, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = Instant::now();
        let out = f(self);
        let elapsed = &mut self.elapsed[slot.index()];
        *elapsed = Some(elapsed.unwrap_or_default() + start.elapsed());
        out
    }
}

// =============================================================================
// ForestOrchestrator
// =============================================================================

/// Maintains the three forests over a sequence of batches.
///
/// - **PF** (current forest) is built on the first batch and, by default,
///   repaired on every later one.
/// - **AF** (adapted forest) starts as a copy of PF and is repaired only when
///   a batch leaves it repairable.
/// - **TF** (transient forest) is trained on the window of recent batches
///   while AF keeps failing, and replaces AF once that failure persists for
///   more than `cdf_threshold` batches.
///
/// # Example
///
/// ```
/// use adaforest::model::{AdfConfig, ForestOrchestrator, StatusTag};
/// use adaforest::induction::InducerKind;
/// use adaforest::testing::separable_batch;
///
/// let config = AdfConfig::builder()
///     .inducer(InducerKind::Heuristic)
///     .min_leaf_size(1)
///     .build()
///     .unwrap();
/// let mut adf = ForestOrchestrator::new(config).unwrap();
/// let report = adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();
/// assert!(report.has_status(StatusTag::ForestsBuilt));
/// assert_eq!(report.best_accuracy(), 100.0);
/// ```
pub struct ForestOrchestrator {
    config: AdfConfig,
    inducer: Box<dyn TreeInducer>,
    parallelism: Parallelism,
    state: ForestState,
}

impl ForestOrchestrator {
    /// Orchestrator with the configured inducer. Parallelism follows
    /// `n_threads` within the current thread pool.
    pub fn new(config: AdfConfig) -> Result<Self, ConfigError> {
        let parallelism = Parallelism::from_threads(config.thread_count());
        Self::with_parallelism(config, parallelism)
    }

    pub fn with_parallelism(config: AdfConfig, parallelism: Parallelism) -> Result<Self, ConfigError> {
        let inducer = config.inducer.inducer(parallelism);
        Self::with_inducer(config, inducer, parallelism)
    }

    /// Orchestrator with a custom inducer; `config.inducer` is then only
    /// used for naming.
    pub fn with_inducer(
        config: AdfConfig,
        inducer: Box<dyn TreeInducer>,
        parallelism: Parallelism,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = ForestState::new(config.window_threshold);
        Ok(Self {
            config,
            inducer,
            parallelism,
            state,
        })
    }

    #[inline]
    pub fn config(&self) -> &AdfConfig {
        &self.config
    }

    #[inline]
    pub fn forest(&self, slot: ForestSlot) -> &Forest {
        self.state.forest(slot)
    }

    /// Forest that scored best on the latest batch.
    pub fn best_forest(&self) -> &Forest {
        self.state.forest(self.state.best)
    }

    #[inline]
    pub fn best_slot(&self) -> ForestSlot {
        self.state.best
    }

    /// Concept drift counter.
    #[inline]
    pub fn cdf(&self) -> usize {
        self.state.cdf
    }

    #[inline]
    pub fn window(&self) -> &BatchWindow {
        &self.state.window
    }

    /// Whether a transient forest has been built since the start.
    #[inline]
    pub fn tf_ever_built(&self) -> bool {
        self.state.tf_ever_built
    }

    /// Process every batch in order, stopping at the first error.
    pub fn process_stream<I, S>(&mut self, batches: I) -> Result<Vec<BatchReport>, AdfError>
    where
        I: IntoIterator<Item = (S, BatchStats)>,
        S: AsRef<str>,
    {
        batches
            .into_iter()
            .map(|(id, batch)| self.process_batch(id.as_ref(), batch))
            .collect()
    }

    /// Learn from one batch and report how each forest fares on it.
    ///
    /// # Errors
    ///
    /// [`AdfError::Batch`] when a forest cannot be rebuilt from rule-set text
    /// or the window cannot be consolidated. The forests are then left as
    /// they were before the batch.
    pub fn process_batch(&mut self, batch_id: &str, batch: BatchStats) -> Result<BatchReport, AdfError> {
        let batch = Arc::new(batch);
        let mut staged = self.state.stage();
        let mut step = BatchStep {
            batch_id,
            status: Vec::new(),
            elapsed: [None; 3],
        };

        if staged.pf.is_empty() {
            self.first_batch(&mut staged, &mut step, &batch)?;
        } else {
            self.next_batch(&mut staged, &mut step, &batch)?;
        }

        let report = self.evaluate(&mut staged, step, &batch);
        info!(
            batch = batch_id,
            best = %report.best,
            accuracy = report.best_accuracy(),
            cdf = report.cdf,
            status = %report.status_line(),
            "batch processed"
        );
        let changes = staged.into_changes();
        self.state.commit(changes);
        Ok(report)
    }

    // --- batch steps ---

    fn first_batch(&self, state: &mut StagedState<'_>, step: &mut BatchStep<'_>, batch: &Arc<BatchStats>) -> Result<(), AdfError> {
        state.window.reset(Arc::clone(batch));
        state.pf = Cow::Owned(step.timed(ForestSlot::PF, |_| self.build(batch)));
        let text = state.pf.to_rule_set();
        let af = step.timed(ForestSlot::AF, |s| {
            Forest::from_rule_set(&text, batch)
                .map_err(|e| AdfError::from(e).in_batch(s.batch_id, ForestSlot::AF, Stage::Parse))
        })?;
        state.af = Cow::Owned(af);
        step.status.push(StatusTag::ForestsBuilt);
        Ok(())
    }

    fn next_batch(&self, state: &mut StagedState<'_>, step: &mut BatchStep<'_>, batch: &Arc<BatchStats>) -> Result<(), AdfError> {
        state.window.push(Arc::clone(batch));

        if self.config.pf_always_update {
            let pf = state.pf.to_mut();
            step.timed(ForestSlot::PF, |s| self.repair(pf, ForestSlot::PF, batch, true, s));
        }

        let af = state.af.to_mut();
        let af_repaired = step.timed(ForestSlot::AF, |s| self.repair(af, ForestSlot::AF, batch, false, s));
        if af_repaired {
            state.cdf = 0;
            if !state.tf.is_empty() {
                state.tf = Cow::Owned(Forest::new());
            }
            return Ok(());
        }

        state.cdf += 1;
        state.tf_ever_built = true;
        if state.tf.is_empty() {
            let training = self.consolidate(state, step)?;
            state.tf = Cow::Owned(step.timed(ForestSlot::TF, |_| self.build(&training)));
            step.status.push(StatusTag::TransientBuilt);
            return Ok(());
        }

        let tf = state.tf.to_mut();
        let tf_repaired = step.timed(ForestSlot::TF, |s| self.repair(tf, ForestSlot::TF, batch, false, s));
        if tf_repaired {
            return Ok(());
        }

        let training = self.consolidate(state, step)?;
        let previous = state.tf.vocabulary().to_vec();
        let mut rebuilt = step.timed(ForestSlot::TF, |_| self.build(&training));
        rebuilt.inherit_vocabulary(&previous);
        state.tf = Cow::Owned(rebuilt);
        step.status.push(StatusTag::TransientRebuilt);

        // promotion only follows a rebuild of the transient forest
        if state.cdf > self.config.cdf_threshold {
            let text = state.tf.to_rule_set();
            let previous = state.af.vocabulary().to_vec();
            let mut promoted = step.timed(ForestSlot::AF, |s| {
                Forest::from_rule_set(&text, &training)
                    .map_err(|e| AdfError::from(e).in_batch(s.batch_id, ForestSlot::AF, Stage::Parse))
            })?;
            promoted.inherit_vocabulary(&previous);
            state.af = Cow::Owned(promoted);
            state.cdf = 0;
            state.tf = Cow::Owned(Forest::new());
            step.status.push(StatusTag::Promoted);
            debug!(batch = step.batch_id, "transient forest promoted");
        }
        Ok(())
    }

    /// Score the non-empty forests on `batch` and pick the best; ties go to
    /// PF, then AF, then TF.
    fn evaluate(&self, state: &mut StagedState<'_>, mut step: BatchStep<'_>, batch: &BatchStats) -> BatchReport {
        let mut forests = [ForestEval::default(); 3];
        let mut best: Option<(ForestSlot, f64)> = None;
        for slot in ForestSlot::ALL {
            let forest = state.forest(slot);
            let eval = &mut forests[slot.index()];
            eval.elapsed = step.elapsed[slot.index()];
            if forest.is_empty() {
                continue;
            }
            let accuracy = forest.accuracy(batch);
            eval.accuracy = Some(accuracy);
            if best.map_or(true, |(_, b)| accuracy > b) {
                best = Some((slot, accuracy));
            }
        }
        let best = best.map_or(ForestSlot::PF, |(slot, _)| slot);
        state.best = best;
        step.status.push(StatusTag::Best(best));

        let total_time: Duration = ForestSlot::ALL
            .into_iter()
            .filter(|&slot| slot != ForestSlot::AF || state.tf_ever_built)
            .filter_map(|slot| step.elapsed[slot.index()])
            .sum();

        BatchReport {
            batch_id: step.batch_id.to_string(),
            forests,
            best,
            status: step.status,
            cdf: state.cdf,
            total_time,
        }
    }

    // --- helpers ---

    fn build(&self, batch: &BatchStats) -> Forest {
        Forest::build_from_inducer(
            batch,
            self.inducer.as_ref(),
            self.config.ensemble_size,
            self.config.min_leaf_size,
            self.config.seed,
        )
    }

    fn consolidate(&self, state: &StagedState<'_>, step: &BatchStep<'_>) -> Result<BatchStats, AdfError> {
        state
            .window
            .consolidate()
            .map_err(|e| AdfError::from(e).in_batch(step.batch_id, ForestSlot::TF, Stage::Consolidate))
    }

    /// Repair `forest` on `batch`; returns whether it now fits the batch.
    ///
    /// A repair that breaks a tree's structure escalates to inducing the
    /// forest again on `batch`.
    fn repair(
        &self,
        forest: &mut Forest,
        slot: ForestSlot,
        batch: &BatchStats,
        force: bool,
        step: &mut BatchStep<'_>,
    ) -> bool {
        let repairer = StructuralRepairer::new(self.inducer.as_ref(), self.config.repair_params(self.parallelism));
        match repairer.repair_or_skip(forest, batch, force) {
            Ok(outcome) => {
                debug!(
                    batch = step.batch_id,
                    forest = %slot,
                    perturbed = outcome.assessment.total_perturbed,
                    leaves = outcome.assessment.total_leaves,
                    ratio = outcome.assessment.ratio,
                    num_new = outcome.num_new,
                    repaired = outcome.repaired,
                    "repair assessed"
                );
                if outcome.repaired {
                    step.status.push(StatusTag::Repaired(slot));
                }
                outcome.repaired
            }
            Err(err) => {
                warn!(batch = step.batch_id, forest = %slot, %err, "repair broke forest structure, rebuilding");
                let previous = forest.vocabulary().to_vec();
                *forest = self.build(batch);
                forest.inherit_vocabulary(&previous);
                step.status.push(StatusTag::Rebuilt(slot));
                true
            }
        }
    }
}
