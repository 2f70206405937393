use std::sync::Arc;

use rand::prelude::*;

use crate::data::{Attribute, BatchStats, Record, Schema, Value};

/// Two numeric attributes `x1`, `x2` and an open class attribute `class`.
pub fn synthetic_schema() -> Arc<Schema> {
	let attributes = vec![
		Attribute::numeric("x1"),
		Attribute::numeric("x2"),
		Attribute::categorical("class", Vec::<String>::new()),
	];
	match Schema::new("synthetic", attributes, None) {
		Ok(schema) => Arc::new(schema),
		Err(err) => panic!("synthetic schema is valid: {err}"),
	}
}

/// Batch of `(x1, x2, class)` rows over [`synthetic_schema`].
pub fn labelled_batch(rows: &[(f64, f64, &str)]) -> BatchStats {
	let records = rows
		.iter()
		.map(|&(x1, x2, class)| {
			Record::new(vec![
				Value::Numeric(x1),
				Value::Numeric(x2),
				Value::Nominal(class.to_string()),
			])
		})
		.collect();
	match BatchStats::from_records(synthetic_schema(), records) {
		Ok(batch) => batch,
		Err(err) => panic!("labelled rows are valid: {err}"),
	}
}

/// `n` rows with `x1` evenly spread over `[offset, offset + 10)`, class
/// `yes` below `offset + 5` and `no` above. `x2` cycles through `0..10`
/// independently of the class.
pub fn separable_batch(n: usize, offset: f64) -> BatchStats {
	let rows: Vec<(f64, f64, &str)> = (0..n)
		.map(|i| {
			let x1 = offset + 10.0 * i as f64 / n as f64;
			let x2 = ((i * 7) % 10) as f64;
			let class = if x1 < offset + 5.0 { "yes" } else { "no" };
			(x1, x2, class)
		})
		.collect();
	labelled_batch(&rows)
}

/// `n` random rows with `x1, x2` uniform in `[min, max)`. The class is drawn
/// from `classes` by the position of `x1` in the range, then flipped to a
/// random class with probability `noise`.
pub fn noisy_batch(n: usize, seed: u64, min: f64, max: f64, classes: &[&str], noise: f64) -> BatchStats {
	assert!(max > min);
	assert!(!classes.is_empty());
	let mut rng = StdRng::seed_from_u64(seed);
	let width = max - min;
	let rows: Vec<(f64, f64, &str)> = (0..n)
		.map(|_| {
			let x1 = min + rng.gen::<f64>() * width;
			let x2 = min + rng.gen::<f64>() * width;
			let bucket = (((x1 - min) / width) * classes.len() as f64) as usize;
			let mut class = classes[bucket.min(classes.len() - 1)];
			if rng.gen::<f64>() < noise {
				class = classes[rng.gen_range(0..classes.len())];
			}
			(x1, x2, class)
		})
		.collect();
	labelled_batch(&rows)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn separable_batch_is_balanced() {
		let batch = separable_batch(20, 10.0);
		assert_eq!(batch.class_values(), ["yes", "no"]);
		assert_eq!(batch.class_counts(), [10, 10]);
		assert_eq!(batch.min()[0], 10.0);
	}

	#[test]
	fn noisy_batch_is_seeded() {
		let a = noisy_batch(50, 3, 0.0, 1.0, &["a", "b"], 0.1);
		let b = noisy_batch(50, 3, 0.0, 1.0, &["a", "b"], 0.1);
		assert_eq!(a.records(), b.records());
		assert!(a.max()[0] < 1.0);
	}
}
