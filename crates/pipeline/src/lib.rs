//! # Castor Pipeline
//!
//! Drives a complete dam-effects run: one [`PipelineConfig`] and one
//! backend in, one [`RunOutput`] out. No state survives between runs.
//!
//! ```ignore
//! use castor_pipeline::{Pipeline, PipelineConfig, PipelineInput};
//!
//! let output = Pipeline::new(PipelineConfig::default(), &backend).run(&input)?;
//! println!("{}", output.report);
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod run;

pub use config::{PipelineConfig, SceneWindow};
pub use error::{PipelineError, Result};
pub use report::{ChunkFailure, ExcludedItem, Manifest, RejectedPoint, RunReport, SamplingDeficit, Stage};
pub use run::{Pipeline, PipelineInput, RunOutput};
