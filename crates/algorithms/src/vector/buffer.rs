//! Buffer operations
//!
//! Circles around WGS84 points, approximated as polygons. The radius is in
//! meters and converted to degrees at the point's latitude, so the polygon
//! is an ellipse in lon/lat that is round on the ground.

use geo::{LineString, Point, Polygon};
use std::f64::consts::PI;

use castor_core::geodesy::meters_to_degrees;

/// Parameters for buffer operations
#[derive(Debug, Clone, Copy)]
pub struct BufferParams {
    /// Buffer radius in meters
    pub distance_m: f64,
    /// Number of segments to approximate the circle (default: 32)
    pub segments: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance_m: 150.0,
            segments: 32,
        }
    }
}

/// Create a circular buffer around a (lon, lat) point.
pub fn buffer_point(point: Point<f64>, params: &BufferParams) -> Polygon<f64> {
    let n = params.segments.max(4);
    let (rx, ry) = meters_to_degrees(params.distance_m.abs(), point.y());

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((point.x() + rx * angle.cos(), point.y() + ry * angle.sin()));
    }
    // Close the ring
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}
