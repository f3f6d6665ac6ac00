//! Raster service wire types.
//!
//! Lightweight serde models for the four service endpoints. Rasters travel
//! as row-major arrays on the request grid; `null` marks a no-data pixel.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use castor_core::{EtRequest, GridSpec, Raster, SceneRequest};

use crate::error::{CloudError, Result};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body for `POST /v1/scenes:search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSearchBody {
    pub requests: Vec<SceneQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneQuery {
    /// `[west, south, east, north]`
    pub bbox: [f64; 4],
    pub grid: GridSpec,
    /// Inclusive `start/end` interval, e.g. `"2020-01-01/2020-12-31"`
    pub datetime: String,
    pub collections: Vec<String>,
    pub max_cloud_percent: f64,
}

impl From<&SceneRequest> for SceneQuery {
    fn from(r: &SceneRequest) -> Self {
        Self {
            bbox: r.grid.bbox(),
            grid: r.grid,
            datetime: format!("{}/{}", r.start, r.end),
            collections: r.collections.clone(),
            max_cloud_percent: r.max_cloud_percent,
        }
    }
}

/// Body for `POST /v1/elevation:sample`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationSampleBody {
    /// `[lon, lat]` pairs
    pub points: Vec<[f64; 2]>,
}

/// Body for `POST /v1/elevation:grid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationGridBody {
    pub grids: Vec<GridSpec>,
}

/// Body for `POST /v1/et:reduce`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtReduceBody {
    pub requests: Vec<EtQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtQuery {
    pub grid: GridSpec,
    /// Row-major 0/1 mask on `grid`
    pub mask: Vec<u8>,
    pub year: i32,
    pub month: u32,
}

impl From<&EtRequest> for EtQuery {
    fn from(r: &EtRequest) -> Self {
        Self {
            grid: r.grid,
            mask: r.mask.data().iter().copied().collect(),
            year: r.year,
            month: r.month,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response of `scenes:search`: one scene list per request, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSearchResponse {
    pub results: Vec<Vec<SceneWire>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneWire {
    pub id: String,
    pub date: NaiveDate,
    /// Scene cloud cover in percent
    pub cloud_cover: f64,
    /// Bands hold unscaled Collection 2 digital numbers
    #[serde(default)]
    pub digital_numbers: bool,
    pub bands: BandsWire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandsWire {
    pub red: Vec<Option<f64>>,
    pub green: Vec<Option<f64>>,
    pub nir: Vec<Option<f64>>,
    pub thermal: Vec<Option<f64>>,
    pub qa: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationSampleResponse {
    pub elevations: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationGridResponse {
    pub grids: Vec<Option<Vec<Option<f64>>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtReduceResponse {
    pub values: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Build a float raster on `grid` from a row-major wire array.
///
/// `null` becomes NaN, the crate-wide no-data marker for float bands.
pub fn float_raster(values: &[Option<f64>], grid: &GridSpec) -> Result<Raster<f64>> {
    expect_pixels(values.len(), grid)?;
    let data = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    Ok(Raster::from_vec(data, grid.rows, grid.cols)?.with_transform(grid.transform))
}

/// Build a QA raster on `grid`.
pub fn qa_raster(values: &[u16], grid: &GridSpec) -> Result<Raster<u16>> {
    expect_pixels(values.len(), grid)?;
    Ok(Raster::from_vec(values.to_vec(), grid.rows, grid.cols)?.with_transform(grid.transform))
}

fn expect_pixels(got: usize, grid: &GridSpec) -> Result<()> {
    if got != grid.len() {
        return Err(CloudError::InvalidResponse(format!(
            "raster has {got} pixels, grid {}x{} needs {}",
            grid.rows,
            grid.cols,
            grid.len()
        )));
    }
    Ok(())
}
