//! # Castor Core
//!
//! Core types and traits shared by every stage of the dam-effects pipeline.
//!
//! This crate provides:
//! - `SamplePoint` and the standardizer that assigns `P#`/`N#` identifiers
//! - `Raster<T>` grids with a `GeoTransform` for per-zone pixel blocks
//! - `AnalysisZone`, `SceneRecord`, `MetricRecord` and the time-series types
//! - Backend traits (`ElevationBackend`, `SceneBackend`,
//!   `EvapotranspirationBackend`) implemented by remote clients and fakes
//! - The error taxonomy (`Error`, `BackendError`)

pub mod backend;
pub mod error;
pub mod geodesy;
pub mod raster;
pub mod record;
pub mod sample;
pub mod zone;

pub use backend::{
    ElevationBackend, EtRequest, EvapotranspirationBackend, RasterBackend, SceneBackend,
    SceneRequest,
};
pub use error::{BackendError, BackendResult, Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};
pub use record::{
    AggregationPeriod, ComparisonGroup, ComparisonPoint, MetricRecord, PeriodKey, SceneBands,
    SceneRecord, TimeSeriesPoint,
};
pub use sample::{Candidate, CandidatePool, Label, RawPoint, SamplePoint, Standardizer};
pub use zone::{AnalysisZone, ElevationBand, ZoneRole};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{
        ElevationBackend, EvapotranspirationBackend, RasterBackend, SceneBackend,
    };
    pub use crate::error::{BackendError, BackendResult, Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
    pub use crate::record::{MetricRecord, SceneRecord, TimeSeriesPoint};
    pub use crate::sample::{Label, SamplePoint};
    pub use crate::zone::{AnalysisZone, ZoneRole};
}
