//! End-to-end batch scenarios through the orchestrator.
//!
//! All scenarios use the deterministic heuristic inducer with a minimum leaf
//! size of 1 so tree shapes are predictable.

use adaforest::adapt::{assess, RepairParams, StructuralRepairer};
use adaforest::induction::{HeuristicInducer, InducerKind};
use adaforest::model::{AdfConfig, ForestOrchestrator, ForestSlot, StatusTag};
use adaforest::repr::{SplitCondition, SplitOp, Threshold};
use adaforest::testing::{labelled_batch, separable_batch};
use adaforest::{BatchStats, Forest, Tree};
use approx::assert_abs_diff_eq;

// =============================================================================
// Helpers
// =============================================================================

fn orchestrator(cdf_threshold: usize) -> ForestOrchestrator {
	windowed_orchestrator(cdf_threshold, 3)
}

fn windowed_orchestrator(cdf_threshold: usize, window_threshold: usize) -> ForestOrchestrator {
	let config = AdfConfig::builder()
		.inducer(InducerKind::Heuristic)
		.min_leaf_size(1)
		.cdf_threshold(cdf_threshold)
		.window_threshold(window_threshold)
		.build()
		.unwrap();
	ForestOrchestrator::new(config).unwrap()
}

/// `n` rows spread like [`separable_batch`], all labelled `class`.
fn uniform_batch(n: usize, class: &str) -> BatchStats {
	let rows: Vec<(f64, f64, &str)> = (0..n)
		.map(|i| (10.0 * i as f64 / n as f64, ((i * 7) % 10) as f64, class))
		.collect();
	labelled_batch(&rows)
}

/// Like [`separable_batch`] with the labels swapped.
fn flipped_batch(n: usize) -> BatchStats {
	let rows: Vec<(f64, f64, &str)> = (0..n)
		.map(|i| {
			let x1 = 10.0 * i as f64 / n as f64;
			let x2 = ((i * 7) % 10) as f64;
			(x1, x2, if x1 < 5.0 { "no" } else { "yes" })
		})
		.collect();
	labelled_batch(&rows)
}

/// Attribute name and `<=` threshold of the root split.
fn root_split(tree: &Tree) -> (String, f64) {
	let root = tree.node(tree.root());
	let attribute = root.split_attribute().expect("root is a split").name.clone();
	let low = tree.node(root.children()[0]);
	match &low.condition {
		Some(SplitCondition {
			threshold: Threshold::Numeric(t),
			..
		}) => (attribute, *t),
		other => panic!("unexpected root condition {other:?}"),
	}
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn separable_first_batch() {
	let batch = labelled_batch(&[
		(1.0, 3.0, "yes"),
		(2.0, 8.0, "yes"),
		(3.0, 1.0, "yes"),
		(4.0, 6.0, "yes"),
		(4.5, 2.0, "yes"),
		(4.8, 7.0, "yes"),
		(5.2, 3.0, "no"),
		(6.0, 8.0, "no"),
		(7.0, 1.0, "no"),
		(8.0, 6.0, "no"),
	]);
	let mut adf = orchestrator(3);
	let report = adf.process_batch("b1", batch).unwrap();
	assert!(report.has_status(StatusTag::ForestsBuilt));

	for slot in [ForestSlot::PF, ForestSlot::AF] {
		let forest = adf.forest(slot);
		let (attribute, threshold) = root_split(forest.tree(0));
		assert_eq!(attribute, "x1");
		assert_abs_diff_eq!(threshold, 5.0, epsilon = 1e-9);
	}
	assert!(report.forest(ForestSlot::PF).accuracy.unwrap() >= 90.0);
	assert_eq!(
		adf.forest(ForestSlot::PF).to_rule_set(),
		adf.forest(ForestSlot::AF).to_rule_set()
	);
}

#[test]
fn identical_batch_is_repaired_without_drift() {
	let mut adf = orchestrator(3);
	adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();

	let mut af = adf.forest(ForestSlot::AF).clone();
	let params = RepairParams {
		min_leaf_size: 1,
		..RepairParams::default()
	};
	let assessment = assess(&mut af, &separable_batch(20, 0.0), &params);
	assert_eq!(assessment.total_perturbed, 0);
	assert!(assessment.repairable);

	let report = adf.process_batch("b2", separable_batch(20, 0.0)).unwrap();
	assert!(report.has_status(StatusTag::Repaired(ForestSlot::AF)));
	assert_eq!(report.cdf, 0);
	assert_eq!(adf.cdf(), 0);
	assert!(adf.forest(ForestSlot::TF).is_empty());
}

#[test]
fn batch_above_trained_range_grafts_new_root() {
	let mut adf = orchestrator(3);
	adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();
	let report = adf.process_batch("b2", separable_batch(20, 20.0)).unwrap();
	assert!(report.has_status(StatusTag::Repaired(ForestSlot::PF)));

	let tree = adf.forest(ForestSlot::PF).tree(0);
	let root = tree.node(tree.root());
	assert_eq!(root.split_attribute().unwrap().name, "x1");
	let old = tree.node(root.children()[0]);
	let new = tree.node(root.children()[1]);
	// midpoint of the trained max (9.5) and the batch min (20)
	assert_eq!(old.condition, Some(SplitCondition::numeric(SplitOp::Le, 14.75)));
	assert_eq!(new.condition, Some(SplitCondition::numeric(SplitOp::Gt, 14.75)));
	assert_eq!(report.forest(ForestSlot::PF).accuracy, Some(100.0));
}

#[test]
fn new_class_value_reaches_every_leaf() {
	let mut adf = orchestrator(3);
	adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();
	adf.process_batch("b2", separable_batch(20, 0.0)).unwrap();

	let batch3 = labelled_batch(&[(1.0, 1.0, "yes"), (6.0, 2.0, "maybe"), (7.0, 3.0, "no")]);

	// num_new as seen by a repair of the current forest
	let inducer = HeuristicInducer::default();
	let params = RepairParams {
		min_leaf_size: 1,
		..RepairParams::default()
	};
	let mut pf = adf.forest(ForestSlot::PF).clone();
	let outcome = StructuralRepairer::new(&inducer, params)
		.repair_or_skip(&mut pf, &batch3, false)
		.unwrap();
	assert_eq!(outcome.num_new, 1);
	assert!(outcome.repaired);

	let report = adf.process_batch("b3", batch3).unwrap();
	assert!(report.has_status(StatusTag::Repaired(ForestSlot::AF)));
	for slot in [ForestSlot::PF, ForestSlot::AF] {
		let forest: &Forest = adf.forest(slot);
		assert_eq!(forest.vocabulary(), ["yes", "no", "maybe"]);
		for tree in forest.trees() {
			for (_, leaf) in tree.iter_leaves() {
				let distribution = leaf.distribution.as_ref().unwrap();
				assert!(distribution.values().iter().any(|v| v == "maybe"));
			}
		}
	}
}

#[test]
fn persistent_drift_promotes_transient_forest() {
	let mut adf = windowed_orchestrator(1, 1);
	let first = adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();
	assert_eq!(first.cdf, 0);

	// AF cannot absorb the flip, TF is trained on it
	let second = adf.process_batch("b2", flipped_batch(20)).unwrap();
	assert!(!second.has_status(StatusTag::Repaired(ForestSlot::AF)));
	assert!(second.has_status(StatusTag::TransientBuilt));
	assert!(!second.has_status(StatusTag::Promoted));
	assert_eq!(second.cdf, 1);

	// perturbs one of two leaves in both AF and TF, so TF is rebuilt
	let third = adf.process_batch("b3", uniform_batch(20, "no")).unwrap();
	assert!(!third.has_status(StatusTag::Repaired(ForestSlot::AF)));
	assert!(!third.has_status(StatusTag::Repaired(ForestSlot::TF)));
	assert!(third.has_status(StatusTag::TransientRebuilt));
	assert!(third.has_status(StatusTag::Promoted));
	assert_eq!(third.cdf, 0);

	assert_eq!(adf.cdf(), 0);
	assert!(adf.forest(ForestSlot::TF).is_empty());
	let af = adf.forest(ForestSlot::AF);
	assert!(af.trees().iter().all(|tree| tree.is_single_leaf()));
	assert_eq!(af.vocabulary(), ["yes", "no"]);
	assert!(adf.tf_ever_built());
	assert_eq!(adf.window().len(), 1);
}

#[test]
fn repaired_transient_forest_is_not_promoted() {
	let mut adf = windowed_orchestrator(1, 1);
	adf.process_batch("b1", separable_batch(20, 0.0)).unwrap();
	let second = adf.process_batch("b2", flipped_batch(20)).unwrap();
	assert!(second.has_status(StatusTag::TransientBuilt));

	for (id, cdf) in [("b3", 2), ("b4", 3)] {
		let report = adf.process_batch(id, flipped_batch(20)).unwrap();
		assert!(!report.has_status(StatusTag::Repaired(ForestSlot::AF)));
		assert!(report.has_status(StatusTag::Repaired(ForestSlot::TF)));
		assert!(!report.has_status(StatusTag::TransientRebuilt));
		assert!(!report.has_status(StatusTag::Promoted));
		assert_eq!(report.cdf, cdf);
	}
	assert_eq!(adf.cdf(), 3);
	assert!(!adf.forest(ForestSlot::TF).is_empty());
}

#[test]
fn reports_follow_the_stream() {
	let mut adf = orchestrator(3);
	let reports = adf
		.process_stream([
			("b1", separable_batch(20, 0.0)),
			("b2", separable_batch(20, 0.0)),
			("b3", flipped_batch(20)),
		])
		.unwrap();
	let ids: Vec<&str> = reports.iter().map(|r| r.batch_id.as_str()).collect();
	assert_eq!(ids, ["b1", "b2", "b3"]);
	for report in &reports {
		assert!(matches!(report.status.last(), Some(StatusTag::Best(_))));
		assert!(report.cdf <= 3);
	}
	assert_eq!(reports[2].cdf, 1);
	assert!(reports[2].forest(ForestSlot::TF).accuracy.is_some());
}
