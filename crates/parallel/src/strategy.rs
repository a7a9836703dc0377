//! Parallel processing strategies

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Processing mode for batches of independent work items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One item at a time
    Sequential,
    /// All items on the global rayon pool
    #[default]
    Parallel,
    /// At most the given number of items at once
    ParallelWith(usize),
}

/// Strategy for executing independent work items
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    /// Map a fallible function over indices; the first error in index order wins
    fn try_par_map<T, E, F>(&self, range: std::ops::Range<usize>, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send,
    {
        self.par_map(range, f).into_iter().collect()
    }
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: std::ops::Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => {
                match rayon::ThreadPoolBuilder::new()
                    .num_threads((*threads).max(1))
                    .build()
                {
                    Ok(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                    Err(e) => {
                        tracing::warn!(threads, error = %e, "thread pool unavailable, running sequentially");
                        range.map(f).collect()
                    }
                }
            }
        }
    }
}

/// Get the number of threads in the global pool
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}
