//! Candidate pools from waterways, and point deduplication

use geo::{LineString, Point};

use castor_core::geodesy::{haversine_m, LocalProjection};
use castor_core::{CandidatePool, RawPoint};

use super::kdtree::KdTree;

/// Densify waterway lines into candidate points every `spacing_m`.
///
/// Each line contributes its first vertex and then one point per
/// `spacing_m` of haversine length, interpolated along the segments.
pub fn candidates_along(lines: &[LineString<f64>], spacing_m: f64) -> CandidatePool {
    let mut points = Vec::new();
    if spacing_m <= 0.0 {
        return CandidatePool::default();
    }

    for line in lines {
        let coords: Vec<Point<f64>> = line.points().collect();
        let Some(&first) = coords.first() else {
            continue;
        };
        points.push(first);

        // Distance still to walk before the next emitted point
        let mut until_next = spacing_m;
        for pair in coords.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let seg_len = haversine_m(a, b);
            if seg_len <= 0.0 {
                continue;
            }
            let mut along = 0.0;
            while seg_len - along >= until_next {
                along += until_next;
                let t = along / seg_len;
                points.push(Point::new(
                    a.x() + (b.x() - a.x()) * t,
                    a.y() + (b.y() - a.y()) * t,
                ));
                until_next = spacing_m;
            }
            until_next -= seg_len - along;
        }
    }

    CandidatePool::from_points(points)
}

/// Merge points closer than `radius_m` to an earlier kept point.
///
/// Points are visited in input order; each kept point absorbs every later
/// point within the radius and moves to the centroid of its group, keeping
/// its own date, label and source.
pub fn deduplicate(points: &[RawPoint], radius_m: f64) -> Vec<RawPoint> {
    if points.is_empty() {
        return Vec::new();
    }

    let positions: Vec<Point<f64>> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect();
    let proj = LocalProjection::centered_on(&positions);
    let xy: Vec<[f64; 2]> = positions
        .iter()
        .map(|&p| {
            let (x, y) = proj.project(p);
            [x, y]
        })
        .collect();
    let tree = KdTree::build(&xy);

    let mut absorbed = vec![false; points.len()];
    let mut out = Vec::new();

    for i in 0..points.len() {
        if absorbed[i] {
            continue;
        }
        absorbed[i] = true;

        let mut group: Vec<usize> = tree
            .within_radius(xy[i][0], xy[i][1], radius_m * 1.05)
            .into_iter()
            .map(|n| n.index)
            .filter(|&j| !absorbed[j] && haversine_m(positions[i], positions[j]) < radius_m)
            .collect();
        group.sort_unstable();
        for &j in &group {
            absorbed[j] = true;
        }

        let mut kept = points[i].clone();
        if !group.is_empty() {
            let n = (group.len() + 1) as f64;
            kept.longitude =
                (points[i].longitude + group.iter().map(|&j| points[j].longitude).sum::<f64>()) / n;
            kept.latitude =
                (points[i].latitude + group.iter().map(|&j| points[j].latitude).sum::<f64>()) / n;
        }
        out.push(kept);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use castor_core::geodesy::meters_to_degrees;
    use castor_core::Label;

    #[test]
    fn densify_straight_line() {
        let (dlon, _) = meters_to_degrees(1_000.0, 0.0);
        let line = LineString::from(vec![(0.0, 0.0), (dlon, 0.0)]);
        let pool = candidates_along(&[line], 100.0);

        // First vertex plus one point every 100 m over ~998 m of haversine length
        assert_eq!(pool.len(), 10);
        let pts: Vec<_> = pool.iter().map(|c| c.position).collect();
        for w in pts.windows(2) {
            assert_relative_eq!(haversine_m(w[0], w[1]), 100.0, max_relative = 1e-6);
        }
    }

    #[test]
    fn spacing_carries_across_vertices() {
        let (d, _) = meters_to_degrees(150.0, 0.0);
        let line = LineString::from(vec![(0.0, 0.0), (d, 0.0), (2.0 * d, 0.0)]);
        let pool = candidates_along(&[line], 100.0);
        let pts: Vec<_> = pool.iter().map(|c| c.position).collect();
        assert_relative_eq!(haversine_m(pts[0], pts[2]), 200.0, max_relative = 1e-6);
    }

    #[test]
    fn close_points_collapse_to_their_centroid() {
        let (dlon, _) = meters_to_degrees(4.0, 41.7);
        let points = vec![
            RawPoint::new(41.7, -111.8, None, Label::Dam),
            RawPoint::new(41.7, -111.8 + dlon, None, Label::Dam),
            RawPoint::new(41.8, -111.8, None, Label::Dam),
        ];
        let out = deduplicate(&points, 10.0);

        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0].longitude, -111.8 + dlon / 2.0, epsilon = 1e-12);
        assert_relative_eq!(out[1].latitude, 41.8);
    }
}
