//! Upstream / downstream split of a dam zone along its waterway
//!
//! The waterway nearest to the dam is cut at its vertex closest to the dam.
//! Waterway lines are assumed to be digitised in flow direction, so the
//! vertices before the cut are upstream and the ones after it downstream.
//! Other lines that touch only one side join that side, over a few rounds so
//! tributaries of tributaries are picked up too. Zone pixels near one side,
//! and nearer to it than to the other, form the corresponding sub-zone.

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use castor_core::geodesy::{
    haversine_m, point_polyline_distance, polyline_distance, LocalProjection,
};
use castor_core::{AnalysisZone, Raster, Result, ZoneRole};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSplitConfig {
    /// A waterway vertex must be this close to the dam to be used
    pub snap_distance_m: f64,
    /// Pixels farther than this from both sides belong to neither sub-zone
    pub buffer_m: f64,
    /// Lines closer than this are treated as connected
    pub touch_tolerance_m: f64,
    /// Passes over the remaining lines when growing each side
    pub connect_rounds: usize,
}

impl Default for FlowSplitConfig {
    fn default() -> Self {
        Self {
            snap_distance_m: 100.0,
            buffer_m: 100.0,
            touch_tolerance_m: 5.0,
            connect_rounds: 3,
        }
    }
}

/// A waterway network divided at a dam.
///
/// Both main parts include the cut vertex. Branches are indices into the
/// waterway slice the split was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSplit {
    pub upstream: Vec<Point<f64>>,
    pub downstream: Vec<Point<f64>>,
    pub upstream_branches: Vec<usize>,
    pub downstream_branches: Vec<usize>,
}

/// Sub-zones of one dam zone. Either side is absent when no pixel falls in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitZones {
    pub upstream: Option<AnalysisZone>,
    pub downstream: Option<AnalysisZone>,
}

/// Cut the waterway closest to `dam` at its nearest vertex, then attach the
/// lines connected to either part.
///
/// Returns `None` when no vertex lies within `snap_distance_m`.
pub fn split_flowline(
    dam: Point<f64>,
    waterways: &[LineString<f64>],
    config: &FlowSplitConfig,
) -> Option<FlowSplit> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (li, line) in waterways.iter().enumerate() {
        for (vi, p) in line.points().enumerate() {
            let d = haversine_m(dam, p);
            if d <= config.snap_distance_m && best.map_or(true, |(_, _, bd)| d < bd) {
                best = Some((li, vi, d));
            }
        }
    }

    let (li, vi, _) = best?;
    let coords: Vec<Point<f64>> = waterways[li].points().collect();
    let mut split = FlowSplit {
        upstream: coords[..=vi].to_vec(),
        downstream: coords[vi..].to_vec(),
        upstream_branches: Vec::new(),
        downstream_branches: Vec::new(),
    };
    attach_branches(dam, waterways, li, &mut split, config);
    Some(split)
}

/// Grow both sides with the lines that touch exactly one of them. A line
/// touching both, or neither, stays out and is retried in the next round.
fn attach_branches(
    dam: Point<f64>,
    waterways: &[LineString<f64>],
    main: usize,
    split: &mut FlowSplit,
    config: &FlowSplitConfig,
) {
    let proj = LocalProjection::new(dam);
    let project = |pts: &mut dyn Iterator<Item = Point<f64>>| -> Vec<(f64, f64)> {
        pts.map(|p| proj.project(p)).collect()
    };
    let lines: Vec<Vec<(f64, f64)>> = waterways
        .iter()
        .map(|l| project(&mut l.points()))
        .collect();

    let mut up = vec![project(&mut split.upstream.iter().copied())];
    let mut down = vec![project(&mut split.downstream.iter().copied())];
    let touches = |line: &[(f64, f64)], side: &[Vec<(f64, f64)>]| {
        side.iter()
            .any(|part| polyline_distance(line, part) <= config.touch_tolerance_m)
    };

    let mut pending: Vec<usize> = (0..waterways.len()).filter(|&i| i != main).collect();
    for _ in 0..config.connect_rounds {
        let mut joined_up = Vec::new();
        let mut joined_down = Vec::new();
        pending.retain(|&i| match (touches(&lines[i], &up), touches(&lines[i], &down)) {
            (true, false) => {
                joined_up.push(i);
                false
            }
            (false, true) => {
                joined_down.push(i);
                false
            }
            _ => true,
        });
        if joined_up.is_empty() && joined_down.is_empty() {
            break;
        }
        up.extend(joined_up.iter().map(|&i| lines[i].clone()));
        down.extend(joined_down.iter().map(|&i| lines[i].clone()));
        split.upstream_branches.extend(joined_up);
        split.downstream_branches.extend(joined_down);
    }
    split.upstream_branches.sort_unstable();
    split.downstream_branches.sort_unstable();
}

/// Split `zone` into upstream and downstream sub-zones.
///
/// Sub-zones keep the parent's elevation band, radius and grid; only the
/// mask changes. Pixels equidistant from both sides are left out.
pub fn split_zone(
    zone: &AnalysisZone,
    waterways: &[LineString<f64>],
    config: &FlowSplitConfig,
) -> Result<SplitZones> {
    let Some(split) = split_flowline(zone.point.position(), waterways, config) else {
        return Ok(SplitZones::default());
    };

    let proj = LocalProjection::new(zone.point.position());
    let project = |part: &mut dyn Iterator<Item = Point<f64>>| -> Vec<(f64, f64)> {
        part.map(|p| proj.project(p)).collect()
    };
    let side = |main: &[Point<f64>], branches: &[usize]| -> Vec<Vec<(f64, f64)>> {
        std::iter::once(project(&mut main.iter().copied()))
            .chain(branches.iter().map(|&i| project(&mut waterways[i].points())))
            .collect()
    };
    let up = side(&split.upstream, &split.upstream_branches);
    let down = side(&split.downstream, &split.downstream_branches);
    let distance = |xy: (f64, f64), lines: &[Vec<(f64, f64)>]| {
        lines
            .iter()
            .map(|l| point_polyline_distance(xy, l))
            .fold(f64::INFINITY, f64::min)
    };

    let (rows, cols) = zone.mask.shape();
    let mut up_mask: Raster<u8> = Raster::new(rows, cols).with_transform(zone.grid.transform);
    let mut down_mask: Raster<u8> = Raster::new(rows, cols).with_transform(zone.grid.transform);

    for ((row, col), &m) in zone.mask.data().indexed_iter() {
        if m == 0 {
            continue;
        }
        let xy = proj.project(zone.grid.pixel_center(row, col));
        let du = distance(xy, &up);
        let dd = distance(xy, &down);
        if du.min(dd) > config.buffer_m {
            continue;
        }
        if du < dd {
            up_mask.set(row, col, 1)?;
        } else if dd < du {
            down_mask.set(row, col, 1)?;
        }
    }

    let upstream = zone.derive(ZoneRole::Upstream, up_mask);
    let downstream = zone.derive(ZoneRole::Downstream, down_mask);

    debug!(
        zone = %zone.id,
        upstream = upstream.pixel_count(),
        downstream = downstream.pixel_count(),
        branches_up = split.upstream_branches.len(),
        branches_down = split.downstream_branches.len(),
        "zone split along waterway"
    );

    Ok(SplitZones {
        upstream: (upstream.pixel_count() > 0).then_some(upstream),
        downstream: (downstream.pixel_count() > 0).then_some(downstream),
    })
}
