//! Elevation-constrained analysis zones
//!
//! A zone is the set of pixels within `radius_m` of a point whose elevation
//! lies within `elevation_tolerance_m` of the elevation at the point itself.
//! It keeps the analysis on the valley floor a dam can actually flood.

use serde::{Deserialize, Serialize};
use tracing::debug;

use castor_core::geodesy::haversine_m;
use castor_core::zone::ElevationBand;
use castor_core::{
    AnalysisZone, BackendError, BackendResult, ElevationBackend, Error, GridSpec, Raster, Result,
    SamplePoint, ZoneRole,
};

use crate::vector::{buffer_point, BufferParams};

/// Zone construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub radius_m: f64,
    /// Half width of the elevation band
    pub elevation_tolerance_m: f64,
    /// Grid resolution the elevation block and scenes are requested at
    pub scale_m: f64,
    /// Vertices of the buffer polygon
    pub segments: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            radius_m: 150.0,
            elevation_tolerance_m: 3.0,
            scale_m: 30.0,
            segments: 32,
        }
    }
}

/// Build zones for a chunk of points.
///
/// Makes exactly two backend calls: one elevation sample for every point and
/// one elevation grid for every point that has a sample. The outer error is a
/// chunk-level backend failure; per-point coverage problems are returned as
/// inner errors in input order.
pub fn build_zones(
    points: &[SamplePoint],
    backend: &dyn ElevationBackend,
    config: &ZoneConfig,
) -> BackendResult<Vec<Result<AnalysisZone>>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let positions: Vec<_> = points.iter().map(SamplePoint::position).collect();
    let samples = backend.sample_elevation(&positions)?;
    expect_len("elevation samples", samples.len(), points.len())?;

    let grids: Vec<GridSpec> = positions
        .iter()
        .map(|&p| GridSpec::around(p, config.radius_m, config.scale_m))
        .collect();

    let covered: Vec<usize> = (0..points.len()).filter(|&i| samples[i].is_some()).collect();
    let requested: Vec<GridSpec> = covered.iter().map(|&i| grids[i]).collect();
    let blocks = if requested.is_empty() {
        Vec::new()
    } else {
        backend.elevation_grid(&requested)?
    };
    expect_len("elevation grids", blocks.len(), requested.len())?;

    let mut block_of: Vec<Option<Raster<f64>>> = vec![None; points.len()];
    for (i, block) in covered.into_iter().zip(blocks) {
        block_of[i] = block;
    }

    let zones = points
        .iter()
        .zip(samples)
        .zip(block_of)
        .zip(grids)
        .map(|(((point, sample), block), grid)| {
            let unavailable = || Error::ElevationUnavailable {
                point_id: point.id.clone(),
            };
            let center = sample.filter(|e| e.is_finite()).ok_or_else(unavailable)?;
            let block = block.ok_or_else(unavailable)?;
            assemble_zone(point, center, &block, grid, config)
        })
        .collect::<Vec<_>>();

    debug!(
        points = points.len(),
        built = zones.iter().filter(|z| z.is_ok()).count(),
        "zone chunk built"
    );
    Ok(zones)
}

/// Build the zone of a single point.
pub fn build_zone(
    point: &SamplePoint,
    backend: &dyn ElevationBackend,
    config: &ZoneConfig,
) -> Result<AnalysisZone> {
    build_zones(std::slice::from_ref(point), backend, config)?
        .pop()
        .unwrap_or_else(|| {
            Err(Error::ElevationUnavailable {
                point_id: point.id.clone(),
            })
        })
}

/// Radius and elevation-band mask of one zone grid.
///
/// A cell is kept when its center is within `radius_m` (haversine) of the
/// point and its elevation lies inside `band`.
pub fn zone_mask(
    point: &SamplePoint,
    grid: &GridSpec,
    elevation: &Raster<f64>,
    band: ElevationBand,
    radius_m: f64,
) -> Result<Raster<u8>> {
    if elevation.shape() != (grid.rows, grid.cols) {
        return Err(Error::SizeMismatch {
            er: grid.rows,
            ec: grid.cols,
            ar: elevation.rows(),
            ac: elevation.cols(),
        });
    }

    let center = point.position();
    let mut mask = Raster::new(grid.rows, grid.cols).with_transform(grid.transform);
    for ((row, col), &z) in elevation.data().indexed_iter() {
        if !band.contains(z) {
            continue;
        }
        if haversine_m(center, grid.pixel_center(row, col)) <= radius_m {
            mask.set(row, col, 1)?;
        }
    }
    Ok(mask)
}

fn assemble_zone(
    point: &SamplePoint,
    center_elevation: f64,
    block: &Raster<f64>,
    grid: GridSpec,
    config: &ZoneConfig,
) -> Result<AnalysisZone> {
    let band = ElevationBand::around(center_elevation, config.elevation_tolerance_m);
    let mask = zone_mask(point, &grid, block, band, config.radius_m)?;

    let zone = AnalysisZone {
        id: AnalysisZone::zone_id(&point.id, ZoneRole::Whole),
        point: point.clone(),
        role: ZoneRole::Whole,
        center_elevation,
        elevation_band: band,
        radius_m: config.radius_m,
        geometry: buffer_point(
            point.position(),
            &BufferParams {
                distance_m: config.radius_m,
                segments: config.segments,
            },
        ),
        grid,
        mask,
    };

    if zone.pixel_count() == 0 {
        return Err(Error::EmptyZone {
            point_id: point.id.clone(),
        });
    }
    Ok(zone)
}

fn expect_len(what: &str, got: usize, want: usize) -> BackendResult<()> {
    if got != want {
        return Err(BackendError::Protocol(format!(
            "{what}: expected {want} entries, got {got}"
        )));
    }
    Ok(())
}
