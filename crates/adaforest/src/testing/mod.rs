//! Synthetic batches for tests and benchmarks.

mod data;

pub use data::{labelled_batch, noisy_batch, separable_batch, synthetic_schema};
