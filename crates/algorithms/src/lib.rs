//! # Castor Algorithms
//!
//! Per-zone computations of the dam-effects pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **sampling**: Negative (control) point sampling, candidate densification, deduplication
//! - **zones**: Elevation-constrained analysis zones, upstream / downstream split
//! - **imagery**: NDVI, NDWI, cloud screening, land surface temperature, calibration
//! - **statistics**: Masked zonal reductions
//! - **metrics**: Per-scene metric records for a zone
//! - **aggregate**: Periodic time series and group comparisons
//! - **vector**: Geodesic buffers

pub mod aggregate;
pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod metrics;
pub mod sampling;
pub mod statistics;
pub mod vector;
pub mod zones;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{aggregate, compare};
    pub use crate::imagery::{
        land_surface_temperature, ndvi, ndwi, normalized_difference, CloudFilter, LstParams,
        ScaleFactors, SceneVerdict,
    };
    pub use crate::metrics::{compute_metrics, compute_metrics_chunk, MetricConfig, ZoneMetrics};
    pub use crate::sampling::{
        candidates_along, deduplicate, sample_negatives, SamplingConfig, SamplingOutcome,
    };
    pub use crate::zones::{
        build_zone, build_zones, split_zone, validate_dams, FlowSplitConfig, ZoneConfig,
    };
    pub use castor_core::prelude::*;
}
