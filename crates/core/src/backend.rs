//! Remote raster backend traits
//!
//! Every method takes a whole chunk of requests and answers them in the same
//! order, so one chunk is exactly one backend call. A failure applies to the
//! whole chunk; per-item absence is expressed with `None`.

use chrono::NaiveDate;

use crate::error::BackendResult;
use crate::raster::{GridSpec, Raster};
use crate::record::SceneRecord;

/// Point and grid elevation lookups against a DEM.
pub trait ElevationBackend: Send + Sync {
    /// Elevation in meters at each (lon, lat) point, `None` where the DEM
    /// has no coverage.
    fn sample_elevation(&self, points: &[geo::Point<f64>]) -> BackendResult<Vec<Option<f64>>>;

    /// Elevation block on each grid, `None` where the DEM has no coverage.
    fn elevation_grid(&self, grids: &[GridSpec]) -> BackendResult<Vec<Option<Raster<f64>>>>;
}

/// Filtered image collection search.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRequest {
    pub grid: GridSpec,
    /// First day of the window, inclusive
    pub start: NaiveDate,
    /// Last day of the window, inclusive
    pub end: NaiveDate,
    pub collections: Vec<String>,
    /// Server-side pre-filter on scene cloud cover, in percent
    pub max_cloud_percent: f64,
}

pub trait SceneBackend: Send + Sync {
    /// Scenes intersecting each request's grid within its date window,
    /// resampled onto that grid.
    fn fetch_scenes(&self, requests: &[SceneRequest]) -> BackendResult<Vec<Vec<SceneRecord>>>;
}

/// Masked mean of the monthly ET product over one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct EtRequest {
    pub grid: GridSpec,
    /// Pixels to reduce over (non-zero cells)
    pub mask: Raster<u8>,
    pub year: i32,
    pub month: u32,
}

pub trait EvapotranspirationBackend: Send + Sync {
    /// Mean ET for each request, `None` where the product has no data.
    fn reduce_et(&self, requests: &[EtRequest]) -> BackendResult<Vec<Option<f64>>>;
}

/// Everything the pipeline needs from one service.
pub trait RasterBackend: ElevationBackend + SceneBackend + EvapotranspirationBackend {}

impl<T> RasterBackend for T where T: ElevationBackend + SceneBackend + EvapotranspirationBackend {}
