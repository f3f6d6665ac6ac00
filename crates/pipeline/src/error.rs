//! Errors that stop a run

use castor_parallel::BatchAbort;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: String, reason: String },

    #[error(transparent)]
    Aborted(#[from] BatchAbort),

    #[error(transparent)]
    Core(#[from] castor_core::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
