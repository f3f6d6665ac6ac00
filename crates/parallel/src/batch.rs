//! Chunked execution against a size-limited backend
//!
//! Items are cut into contiguous chunks of `batch_size`. A chunk that fails
//! with a capacity or transport error is halved and each half retried, up to
//! `max_splits` levels deep. Chunks that still fail are recorded as failed
//! ranges and the run continues; a fatal error aborts the run.
//!
//! Outputs are merged by chunk start index, so concatenating them gives the
//! same order as the input regardless of scheduling.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use castor_core::{BackendError, BackendResult};

use crate::strategy::{ParallelStrategy, ProcessingMode};

/// Chunking and retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Items per backend call before any split
    pub batch_size: usize,
    /// How many times a failing chunk may be halved
    pub max_splits: u32,
    /// Chunks processed concurrently (0 = all cores)
    pub parallelism: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_splits: 1,
            parallelism: 1,
        }
    }
}

impl BatchOptions {
    /// Larger starting chunks for cheap per-item requests
    pub const LARGE_BATCH_SIZE: usize = 30;

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Output of one successful backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome<R> {
    /// First item index (inclusive)
    pub start: usize,
    /// Last item index (exclusive)
    pub end: usize,
    pub output: R,
}

/// Items that could not be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRange {
    pub start: usize,
    pub end: usize,
    pub error: BackendError,
}

impl FailedRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Everything a batched run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<R> {
    /// Successful chunks ordered by `start`
    pub chunks: Vec<ChunkOutcome<R>>,
    /// Failed ranges ordered by `start`
    pub failed: Vec<FailedRange>,
    /// Backend calls made, retries included
    pub calls: usize,
}

impl<R> Default for BatchOutcome<R> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            failed: Vec::new(),
            calls: 0,
        }
    }
}

impl<R> BatchOutcome<R> {
    /// Whether every item ended up in a successful chunk
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Items covered by failed ranges
    pub fn failed_items(&self) -> usize {
        self.failed.iter().map(FailedRange::len).sum()
    }

    /// Chunk outputs in input order
    pub fn into_outputs(self) -> Vec<R> {
        self.chunks.into_iter().map(|c| c.output).collect()
    }

    fn absorb(&mut self, other: BatchOutcome<R>) {
        self.chunks.extend(other.chunks);
        self.failed.extend(other.failed);
        self.calls += other.calls;
    }
}

impl<T> BatchOutcome<Vec<T>> {
    /// Concatenated per-item outputs in input order.
    ///
    /// Items of failed ranges are simply missing; use `failed` to locate them.
    pub fn into_flat(self) -> Vec<T> {
        self.chunks.into_iter().flat_map(|c| c.output).collect()
    }
}

/// Errors that stop a batched run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchAbort {
    #[error("run aborted on items {start}..{end}: {error}")]
    Fatal {
        start: usize,
        end: usize,
        error: BackendError,
    },

    #[error("failed to build thread pool: {0}")]
    Pool(String),
}

/// Run `operation` over `items` in backend-safe chunks.
///
/// `operation` receives a contiguous slice and must answer for the whole
/// slice or fail as a whole. Only `BackendError::Fatal` makes this function
/// return an error.
pub fn run_batched<T, R, F>(
    items: &[T],
    options: &BatchOptions,
    operation: F,
) -> Result<BatchOutcome<R>, BatchAbort>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> BackendResult<R> + Sync,
{
    let size = options.batch_size.max(1);
    let ranges: Vec<Range<usize>> = (0..items.len())
        .step_by(size)
        .map(|start| start..(start + size).min(items.len()))
        .collect();

    debug!(
        items = items.len(),
        chunks = ranges.len(),
        batch_size = size,
        "starting batched run"
    );

    let mode = ProcessingMode::from_parallelism(options.parallelism);
    let run_chunk = |i: usize| {
        let r = &ranges[i];
        process_chunk(items, r.start, r.end, 0, options.max_splits, &operation)
    };

    let mut outcome = BatchOutcome::default();

    if mode.is_sequential() {
        for i in 0..ranges.len() {
            outcome.absorb(run_chunk(i)?);
        }
    } else {
        let reports = mode
            .par_map(0..ranges.len(), run_chunk)
            .map_err(|e| BatchAbort::Pool(e.to_string()))?;
        for report in reports {
            outcome.absorb(report?);
        }
    }

    if !outcome.failed.is_empty() {
        warn!(
            failed_ranges = outcome.failed.len(),
            failed_items = outcome.failed_items(),
            "batched run finished with failed ranges"
        );
    }
    Ok(outcome)
}

fn process_chunk<T, R, F>(
    items: &[T],
    start: usize,
    end: usize,
    depth: u32,
    max_splits: u32,
    operation: &F,
) -> Result<BatchOutcome<R>, BatchAbort>
where
    F: Fn(&[T]) -> BackendResult<R>,
{
    let mut outcome = BatchOutcome {
        calls: 1,
        ..Default::default()
    };

    match operation(&items[start..end]) {
        Ok(output) => {
            debug!(start, end, depth, "chunk succeeded");
            outcome.chunks.push(ChunkOutcome { start, end, output });
        }
        Err(error) if error.is_fatal() => {
            return Err(BatchAbort::Fatal { start, end, error });
        }
        Err(error) if error.is_retryable() && depth < max_splits && end - start > 1 => {
            let mid = start + (end - start).div_ceil(2);
            warn!(start, end, %error, "chunk failed, retrying as {}..{} and {}..{}", start, mid, mid, end);
            outcome.absorb(process_chunk(items, start, mid, depth + 1, max_splits, operation)?);
            outcome.absorb(process_chunk(items, mid, end, depth + 1, max_splits, operation)?);
        }
        Err(error) => {
            warn!(start, end, %error, "chunk failed, recording failed range");
            outcome.failed.push(FailedRange { start, end, error });
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every chunk it is called with.
    struct Recorder {
        calls: Mutex<Vec<Range<usize>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, chunk: &[usize]) {
            let range = match (chunk.first(), chunk.last()) {
                (Some(&a), Some(&b)) => a..b + 1,
                _ => 0..0,
            };
            self.calls.lock().unwrap().push(range);
        }

        fn ranges(&self) -> Vec<Range<usize>> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn items(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn chunks_follow_input_order() {
        let rec = Recorder::new();
        let input = items(25);
        let out = run_batched(&input, &BatchOptions::default(), |chunk: &[usize]| {
            rec.record(chunk);
            Ok(chunk.iter().map(|i| i * 10).collect::<Vec<_>>())
        })
        .unwrap();

        assert_eq!(rec.ranges(), vec![0..10, 10..20, 20..25]);
        assert!(out.is_complete());
        assert_eq!(out.into_flat(), input.iter().map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn capacity_error_halves_the_chunk_once() {
        let rec = Recorder::new();
        let input = items(25);
        let out = run_batched(&input, &BatchOptions::default(), |chunk: &[usize]| {
            rec.record(chunk);
            // The backend cannot take more than five items that include item 12
            if chunk.len() > 5 && chunk.contains(&12) {
                return Err(BackendError::Capacity("memory limit exceeded".into()));
            }
            Ok(chunk.to_vec())
        })
        .unwrap();

        assert_eq!(rec.ranges(), vec![0..10, 10..20, 10..15, 15..20, 20..25]);
        let starts: Vec<_> = out.chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(starts, vec![(0, 10), (10, 15), (15, 20), (20, 25)]);
        assert_eq!(out.calls, 5);
        assert_eq!(out.into_flat(), input);
    }

    #[test]
    fn still_failing_halves_become_failed_ranges() {
        let input = items(25);
        let out = run_batched(&input, &BatchOptions::default(), |chunk: &[usize]| {
            if chunk.contains(&12) {
                return Err(BackendError::Capacity("too many pixels".into()));
            }
            Ok(chunk.to_vec())
        })
        .unwrap();

        assert_eq!(out.failed.len(), 1);
        assert_eq!((out.failed[0].start, out.failed[0].end), (10, 15));
        assert_eq!(out.failed_items(), 5);
        // Every item is either produced or inside a failed range
        assert_eq!(out.into_flat().len(), 20);
    }

    #[test]
    fn fatal_error_aborts() {
        let input = items(25);
        let err = run_batched(&input, &BatchOptions::default(), |chunk: &[usize]| {
            if chunk.contains(&15) {
                return Err(BackendError::Fatal("token expired".into()));
            }
            Ok(chunk.to_vec())
        })
        .unwrap_err();

        assert_eq!(
            err,
            BatchAbort::Fatal {
                start: 10,
                end: 20,
                error: BackendError::Fatal("token expired".into()),
            }
        );
    }

    #[test]
    fn protocol_errors_are_not_retried() {
        let rec = Recorder::new();
        let input = items(4);
        let out = run_batched(&input, &BatchOptions::default(), |chunk: &[usize]| {
            rec.record(chunk);
            Err::<Vec<usize>, _>(BackendError::Protocol("unexpected payload".into()))
        })
        .unwrap();

        assert_eq!(rec.ranges().len(), 1);
        assert_eq!(out.failed.len(), 1);
    }

    #[test]
    fn deeper_splits_reach_single_items() {
        let input = items(8);
        let options = BatchOptions {
            batch_size: 8,
            max_splits: 5,
            parallelism: 1,
        };
        let out = run_batched(&input, &options, |chunk: &[usize]| {
            if chunk.len() > 1 && chunk.contains(&3) {
                return Err(BackendError::Transport("connection reset".into()));
            }
            Ok(chunk.to_vec())
        })
        .unwrap();

        assert!(out.is_complete());
        assert!(out.chunks.iter().any(|c| (c.start, c.end) == (3, 4)));
        assert_eq!(out.into_flat(), input);
    }

    #[test]
    fn parallel_merge_matches_sequential() {
        let input = items(97);
        let op = |chunk: &[usize]| -> BackendResult<Vec<usize>> {
            if chunk.len() > 4 && chunk.contains(&40) {
                return Err(BackendError::Capacity("computation timed out".into()));
            }
            Ok(chunk.iter().map(|i| i * i).collect())
        };

        let sequential = run_batched(&input, &BatchOptions::default(), op).unwrap();
        let parallel = run_batched(
            &input,
            &BatchOptions {
                parallelism: 4,
                ..Default::default()
            },
            op,
        )
        .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn batching_does_not_change_results() {
        let input = items(23);
        let op = |chunk: &[usize]| -> BackendResult<Vec<usize>> { Ok(chunk.iter().map(|i| i + 1).collect()) };
        let unbatched = run_batched(&input, &BatchOptions::default().with_batch_size(1000), op)
            .unwrap()
            .into_flat();
        for size in [1, 2, 3, 7, 10, 23] {
            let batched = run_batched(&input, &BatchOptions::default().with_batch_size(size), op)
                .unwrap()
                .into_flat();
            assert_eq!(batched, unbatched, "batch size {size}");
        }
    }

    #[test]
    fn empty_input() {
        let out = run_batched(&[] as &[usize], &BatchOptions::default(), |c: &[usize]| Ok(c.len())).unwrap();
        assert!(out.chunks.is_empty());
        assert_eq!(out.calls, 0);
    }
}
