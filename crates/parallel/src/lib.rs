//! # Castor Parallel
//!
//! Execution strategies for backend-bound work.
//!
//! This crate provides:
//! - `run_batched`: contiguous chunks, halve-and-retry on capacity errors,
//!   deterministic merge and failed-range bookkeeping
//! - `ProcessingMode`: sequential or rayon-pooled execution of chunks

pub mod batch;
pub mod strategy;

pub use batch::{run_batched, BatchAbort, BatchOptions, BatchOutcome, ChunkOutcome, FailedRange};
pub use strategy::{ParallelStrategy, ProcessingMode};
