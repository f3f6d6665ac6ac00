//! Pixel grid a zone is requested and reduced on

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::geodesy::meters_to_degrees;
use crate::raster::GeoTransform;

/// A north-up pixel grid in WGS84 degrees.
///
/// Every backend request for one zone (elevation block, scene bands) is made
/// on the same `GridSpec`, so the returned rasters line up cell for cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    /// Nominal ground resolution in meters
    pub scale_m: f64,
}

impl GridSpec {
    /// Square grid centred on `center`, large enough to hold a circle of
    /// `radius_m` at `scale_m` resolution.
    ///
    /// The side length is odd so the center pixel sits exactly on the point.
    pub fn around(center: Point<f64>, radius_m: f64, scale_m: f64) -> Self {
        let half = (radius_m / scale_m).ceil().max(0.0) as usize;
        let n = 2 * half + 1;
        let (dlon, dlat) = meters_to_degrees(scale_m, center.y());
        let transform = GeoTransform::new(
            center.x() - n as f64 / 2.0 * dlon,
            center.y() + n as f64 / 2.0 * dlat,
            dlon,
            -dlat,
        );
        Self {
            transform,
            rows: n,
            cols: n,
            scale_m,
        }
    }

    /// Bounding box `[west, south, east, north]`
    pub fn bbox(&self) -> [f64; 4] {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.cols, self.rows);
        [min_x, min_y, max_x, max_y]
    }

    /// Pixel center in (lon, lat)
    pub fn pixel_center(&self, row: usize, col: usize) -> Point<f64> {
        let (x, y) = self.transform.pixel_to_geo(col, row);
        Point::new(x, y)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
