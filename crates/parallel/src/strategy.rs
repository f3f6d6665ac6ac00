//! Parallel processing strategies

use rayon::prelude::*;

/// How chunks are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One chunk at a time on the calling thread
    #[default]
    Sequential,
    /// Rayon's global pool
    Parallel,
    /// Dedicated pool with the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a requested number of concurrent chunks.
    ///
    /// `0` means "all cores", `1` is sequential.
    pub fn from_parallelism(parallelism: usize) -> Self {
        match parallelism {
            0 => Self::Parallel,
            1 => Self::Sequential,
            n => Self::ParallelWith(n),
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Sequential)
    }
}

/// Strategy for executing independent units of work
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order.
    ///
    /// Fails only when a dedicated thread pool cannot be created.
    fn par_map<T, F>(
        &self,
        range: std::ops::Range<usize>,
        f: F,
    ) -> Result<Vec<T>, rayon::ThreadPoolBuildError>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(
        &self,
        range: std::ops::Range<usize>,
        f: F,
    ) -> Result<Vec<T>, rayon::ThreadPoolBuildError>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(range.map(f).collect()),
            ProcessingMode::Parallel => Ok(range.into_par_iter().map(f).collect()),
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()?;
                Ok(pool.install(|| range.into_par_iter().map(f).collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallelism_maps_to_mode() {
        assert_eq!(ProcessingMode::from_parallelism(0), ProcessingMode::Parallel);
        assert_eq!(ProcessingMode::from_parallelism(1), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::from_parallelism(4), ProcessingMode::ParallelWith(4));
    }

    #[test]
    fn par_map_preserves_order() {
        for mode in [
            ProcessingMode::Sequential,
            ProcessingMode::Parallel,
            ProcessingMode::ParallelWith(3),
        ] {
            let out = mode.par_map(0..100, |i| i * 2).unwrap();
            assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        }
    }
}
