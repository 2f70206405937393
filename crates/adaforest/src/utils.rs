//! Parallelism configuration and thread pool setup.
//!
//! Per-tree work (drift scans, repair, induction of ensemble members) is
//! independent across trees, so it runs through [`Parallelism`] and never
//! depends on the number of threads for its result.

use rayon::prelude::*;
use tracing::warn;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Components receive this flag and pick rayon or sequential iteration
/// accordingly. The thread pool itself is installed once by
/// [`run_with_threads`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Map over mutable items together with their position. Output order
    /// follows `items`.
    #[inline]
    pub fn maybe_par_map_mut<T, B, F>(self, items: &mut [T], f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        F: Fn(usize, &mut T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            items.par_iter_mut().enumerate().map(|(i, item)| f(i, item)).collect()
        } else {
            items.iter_mut().enumerate().map(|(i, item)| f(i, item)).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// When the pool cannot be created the closure runs sequentially.
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel => match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
            Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
            Err(err) => {
                warn!(%err, n_threads, "thread pool unavailable, running sequentially");
                f(Parallelism::Sequential)
            }
        },
    }
}
