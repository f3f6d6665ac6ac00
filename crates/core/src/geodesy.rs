//! Distances and local metric projections on WGS84 coordinates
//!
//! Points are `geo::Point` in (lon, lat) order. Great-circle distances use
//! the haversine metric space from `geo`; clustering and nearest-neighbour
//! work happens in a local equirectangular projection, which is accurate to
//! well under a percent across the few tens of kilometres a study area spans.

use geo::{Distance, Haversine, Point};

/// Mean meridional length of one degree of latitude, in meters.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine::distance(a, b)
}

/// Size of `meters` in degrees of (longitude, latitude) at latitude `lat`.
pub fn meters_to_degrees(meters: f64, lat: f64) -> (f64, f64) {
    let dlat = meters / METERS_PER_DEGREE;
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    (dlat / cos_lat, dlat)
}

/// Equirectangular projection around a fixed origin, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: Point<f64>,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: Point<f64>) -> Self {
        Self {
            origin,
            cos_lat: origin.y().to_radians().cos().abs().max(1e-6),
        }
    }

    /// Projection centred on the mean position of `points`.
    ///
    /// Falls back to (0, 0) for an empty slice.
    pub fn centered_on(points: &[Point<f64>]) -> Self {
        if points.is_empty() {
            return Self::new(Point::new(0.0, 0.0));
        }
        let n = points.len() as f64;
        let lon = points.iter().map(|p| p.x()).sum::<f64>() / n;
        let lat = points.iter().map(|p| p.y()).sum::<f64>() / n;
        Self::new(Point::new(lon, lat))
    }

    pub fn origin(&self) -> Point<f64> {
        self.origin
    }

    /// (east, north) offset of `p` from the origin, in meters.
    pub fn project(&self, p: Point<f64>) -> (f64, f64) {
        let x = (p.x() - self.origin.x()) * METERS_PER_DEGREE * self.cos_lat;
        let y = (p.y() - self.origin.y()) * METERS_PER_DEGREE;
        (x, y)
    }

    /// Inverse of [`project`](Self::project).
    pub fn unproject(&self, x: f64, y: f64) -> Point<f64> {
        Point::new(
            self.origin.x() + x / (METERS_PER_DEGREE * self.cos_lat),
            self.origin.y() + y / METERS_PER_DEGREE,
        )
    }
}

/// Distance from `p` to the segment `a`-`b` in projected meters.
pub fn point_segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq < 1e-12 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Distance from `p` to a polyline, or infinity for fewer than one vertex.
pub fn point_polyline_distance(p: (f64, f64), line: &[(f64, f64)]) -> f64 {
    match line.len() {
        0 => f64::INFINITY,
        1 => ((p.0 - line[0].0).powi(2) + (p.1 - line[0].1).powi(2)).sqrt(),
        _ => line
            .windows(2)
            .map(|w| point_segment_distance(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Shortest distance between two polylines, 0 where they cross.
pub fn polyline_distance(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return match (a.first(), b.first()) {
            (Some(&p), _) if a.len() == 1 => point_polyline_distance(p, b),
            (_, Some(&p)) if b.len() == 1 => point_polyline_distance(p, a),
            _ => f64::INFINITY,
        };
    }
    let mut best = f64::INFINITY;
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            if segments_cross(sa[0], sa[1], sb[0], sb[1]) {
                return 0.0;
            }
            best = best
                .min(point_segment_distance(sa[0], sb[0], sb[1]))
                .min(point_segment_distance(sa[1], sb[0], sb[1]))
                .min(point_segment_distance(sb[0], sa[0], sa[1]))
                .min(point_segment_distance(sb[1], sa[0], sa[1]));
        }
    }
    best
}

fn segments_cross(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let orient = |a: (f64, f64), b: (f64, f64), c: (f64, f64)| {
        (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
    };
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}
