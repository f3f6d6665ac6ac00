//! Analysis zones

use std::fmt;

use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::raster::{GridSpec, Raster};
use crate::sample::SamplePoint;

/// Which part of the neighbourhood of a point a zone covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneRole {
    Whole,
    Upstream,
    Downstream,
}

impl ZoneRole {
    /// Suffix appended to the point id to form the zone id.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Whole => "",
            Self::Upstream => "-up",
            Self::Downstream => "-down",
        }
    }
}

impl fmt::Display for ZoneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("whole"),
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

/// Closed elevation interval in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationBand {
    pub lower: f64,
    pub upper: f64,
}

impl ElevationBand {
    /// `[center - tolerance, center + tolerance]`
    pub fn around(center: f64, tolerance: f64) -> Self {
        Self {
            lower: center - tolerance,
            upper: center + tolerance,
        }
    }

    /// NaN is never inside.
    pub fn contains(&self, elevation: f64) -> bool {
        elevation >= self.lower && elevation <= self.upper
    }
}

/// The elevation- and radius-bounded pixel set around one point.
///
/// `mask` has the shape of `grid`; a cell is 1 when its center lies within
/// `radius_m` of the point and its elevation lies within `elevation_band`.
/// A built zone always has at least one such cell.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisZone {
    /// Point id plus role suffix (`P3`, `P3-up`, `P3-down`)
    pub id: String,
    pub point: SamplePoint,
    pub role: ZoneRole,
    pub center_elevation: f64,
    pub elevation_band: ElevationBand,
    pub radius_m: f64,
    /// Circular buffer polygon around the point
    pub geometry: Polygon<f64>,
    pub grid: GridSpec,
    pub mask: Raster<u8>,
}

impl AnalysisZone {
    pub fn zone_id(point_id: &str, role: ZoneRole) -> String {
        format!("{point_id}{}", role.suffix())
    }

    /// Number of pixels inside the zone
    pub fn pixel_count(&self) -> usize {
        self.mask.data().iter().filter(|&&m| m != 0).count()
    }

    /// Whether the cell at (row, col) belongs to the zone
    pub fn contains_pixel(&self, row: usize, col: usize) -> bool {
        matches!(self.mask.get(row, col), Ok(m) if m != 0)
    }

    /// Copy of this zone with a different role and mask.
    pub fn derive(&self, role: ZoneRole, mask: Raster<u8>) -> Self {
        Self {
            id: Self::zone_id(&self.point.id, role),
            point: self.point.clone(),
            role,
            center_elevation: self.center_elevation,
            elevation_band: self.elevation_band,
            radius_m: self.radius_m,
            geometry: self.geometry.clone(),
            grid: self.grid,
            mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_symmetric() {
        let band = ElevationBand::around(1520.0, 3.0);
        assert_eq!(band.lower, 1517.0);
        assert_eq!(band.upper, 1523.0);
        assert!(band.contains(1517.0));
        assert!(band.contains(1523.0));
        assert!(!band.contains(1523.5));
        assert!(!band.contains(f64::NAN));
    }

    #[test]
    fn zone_ids_carry_role_suffix() {
        assert_eq!(AnalysisZone::zone_id("P3", ZoneRole::Whole), "P3");
        assert_eq!(AnalysisZone::zone_id("P3", ZoneRole::Upstream), "P3-up");
        assert_eq!(AnalysisZone::zone_id("P3", ZoneRole::Downstream), "P3-down");
    }
}
