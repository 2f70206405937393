//! Sliding window of recent batches.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::data::{write_arff, ArffStream, BatchStats, DataError};

/// The last `capacity` batches, oldest first.
///
/// The transient forest trains on the consolidation of the window. Batches
/// are shared, so cloning a window copies no records.
#[derive(Debug, Clone)]
pub struct BatchWindow {
    batches: VecDeque<Arc<BatchStats>>,
    capacity: usize,
}

impl BatchWindow {
    /// An empty window. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            batches: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Forget every batch and start over from `batch`.
    pub fn reset(&mut self, batch: impl Into<Arc<BatchStats>>) {
        self.batches.clear();
        self.batches.push_back(batch.into());
    }

    /// Append `batch`, evicting the oldest batches beyond capacity.
    pub fn push(&mut self, batch: impl Into<Arc<BatchStats>>) {
        self.batches.push_back(batch.into());
        while self.batches.len() > self.capacity {
            self.batches.pop_front();
            trace!(capacity = self.capacity, "evicted oldest batch from window");
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn batches(&self) -> impl Iterator<Item = &BatchStats> {
        self.batches.iter().map(|batch| &**batch)
    }

    /// Merge the window into one batch.
    ///
    /// The merged records are written as ARFF and ingested again, so the
    /// result is exactly what a reader of the window file would see.
    ///
    /// # Errors
    ///
    /// [`DataError::EmptyBatch`] on an empty window, or whatever the
    /// re-ingestion reports for incompatible schemas.
    pub fn consolidate(&self) -> Result<BatchStats, DataError> {
        let merged = BatchStats::concat(self.batches())?;
        let class_index = merged.schema().class_index();
        let text = write_arff(&merged);
        let mut stream = ArffStream::from_string(&text, Some(class_index))?;
        BatchStats::from_stream(&mut stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{labelled_batch, separable_batch};

    #[test]
    fn fifo_eviction() {
        let mut window = BatchWindow::new(2);
        window.reset(labelled_batch(&[(1.0, 0.0, "a")]));
        window.push(labelled_batch(&[(2.0, 0.0, "b")]));
        window.push(labelled_batch(&[(3.0, 0.0, "c")]));
        assert_eq!(window.len(), 2);
        let firsts: Vec<_> = window.batches().map(|b| b.records()[0].numeric(0)).collect();
        assert_eq!(firsts, [Some(2.0), Some(3.0)]);

        window.reset(labelled_batch(&[(9.0, 0.0, "z")]));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn consolidate_merges_in_order() {
        let mut window = BatchWindow::new(3);
        window.reset(separable_batch(10, 0.0));
        window.push(labelled_batch(&[(100.0, 1.0, "maybe")]));
        let merged = window.consolidate().unwrap();
        assert_eq!(merged.n_records(), 11);
        assert_eq!(merged.class_values(), ["yes", "no", "maybe"]);
        assert_eq!(merged.max()[0], 100.0);
        assert_eq!(merged.schema().class_index(), 2);
    }

    #[test]
    fn clones_share_batches() {
        let batch = Arc::new(separable_batch(10, 0.0));
        let mut window = BatchWindow::new(2);
        window.reset(Arc::clone(&batch));
        let copy = window.clone();
        window.push(labelled_batch(&[(1.0, 0.0, "a")]));
        assert_eq!(Arc::strong_count(&batch), 3);
        assert_eq!(copy.len(), 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn empty_window_cannot_consolidate() {
        let window = BatchWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(matches!(window.consolidate(), Err(DataError::EmptyBatch)));
    }
}
