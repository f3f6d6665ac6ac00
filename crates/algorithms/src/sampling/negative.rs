//! Stratified negative (control) sampling
//!
//! Positives are grouped into square cells of a local metric projection.
//! Every eligible candidate belongs to the cell of its nearest positive when
//! it lies within the outer radius of that positive. Each positive then draws
//! `ratio` candidates from its own cell, falling back to the nearest unchosen
//! eligible candidate anywhere in the pool once the cell is exhausted.
//!
//! A candidate is eligible when it is not excluded and lies at least
//! `separation_floor_m` (haversine) from every positive.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use castor_core::geodesy::{haversine_m, LocalProjection};
use castor_core::{CandidatePool, Label, RawPoint, SamplePoint};
use geo::Point;

use super::kdtree::KdTree;

/// Negative sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Negatives requested per positive
    pub ratio: usize,
    /// Minimum distance between any negative and any positive
    pub separation_floor_m: f64,
    /// Candidates farther than this from every positive are only used as fallback
    pub outer_radius_m: f64,
    /// Side of the stratification cells
    pub cell_size_m: f64,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            ratio: 1,
            separation_floor_m: 200.0,
            outer_radius_m: 500.0,
            cell_size_m: 1_000.0,
            seed: 42,
        }
    }
}

/// Stratification cell index in the local projection.
pub type Cell = (i64, i64);

/// A cell whose positives could not all be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterShortfall {
    pub cell: Cell,
    pub requested: usize,
    pub drawn: usize,
}

impl ClusterShortfall {
    pub fn missing(&self) -> usize {
        self.requested - self.drawn
    }
}

/// One drawn negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledNegative {
    /// Unnumbered point; ids are assigned by the standardizer
    pub point: RawPoint,
    /// Id of the positive it was drawn for
    pub paired_with: String,
    /// Index of the candidate in the pool
    pub candidate: usize,
    /// Drawn outside the positive's cell
    pub fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOutcome {
    pub negatives: Vec<SampledNegative>,
    pub shortfalls: Vec<ClusterShortfall>,
    pub fallback_draws: usize,
}

impl SamplingOutcome {
    /// Total negatives that could not be drawn
    pub fn missing(&self) -> usize {
        self.shortfalls.iter().map(ClusterShortfall::missing).sum()
    }

    /// Negatives as raw points, in draw order.
    pub fn raw_points(&self) -> Vec<RawPoint> {
        self.negatives.iter().map(|n| n.point.clone()).collect()
    }
}

/// Draw control points for `positives` from `candidates`.
///
/// Deterministic for a given seed and input order. Never fails: an
/// exhausted pool is reported through `shortfalls`.
pub fn sample_negatives(
    positives: &[SamplePoint],
    candidates: &CandidatePool,
    config: &SamplingConfig,
) -> SamplingOutcome {
    let mut outcome = SamplingOutcome::default();
    if positives.is_empty() || config.ratio == 0 {
        return outcome;
    }

    let positions: Vec<_> = positives.iter().map(SamplePoint::position).collect();
    let proj = LocalProjection::centered_on(&positions);
    let cell_size = config.cell_size_m.max(1.0);
    let cell_of = |(x, y): (f64, f64)| -> Cell {
        ((x / cell_size).floor() as i64, (y / cell_size).floor() as i64)
    };

    let positive_xy: Vec<[f64; 2]> = positions
        .iter()
        .map(|&p| {
            let (x, y) = proj.project(p);
            [x, y]
        })
        .collect();
    let positive_tree = KdTree::build(&positive_xy);
    let positive_cells: Vec<Cell> = positive_xy.iter().map(|p| cell_of((p[0], p[1]))).collect();

    // East-west distances around a positive are stretched by
    // cos(lat0) / cos(lat) in the shared projection, so the floor query has
    // to cover the worst stretch before haversine confirms each hit.
    let floor_query = (config.separation_floor_m * 1.05 + 1.0) * max_stretch(&proj, &positions);

    let mut eligible = vec![false; candidates.len()];
    let mut clusters: BTreeMap<Cell, Vec<usize>> = BTreeMap::new();
    let candidate_xy: Vec<[f64; 2]> = candidates
        .iter()
        .map(|c| {
            let (x, y) = proj.project(c.position);
            [x, y]
        })
        .collect();

    for (i, cand) in candidates.iter().enumerate() {
        if cand.excluded {
            continue;
        }
        let [x, y] = candidate_xy[i];
        let too_close = positive_tree
            .within_radius(x, y, floor_query)
            .iter()
            .any(|n| haversine_m(cand.position, positions[n.index]) < config.separation_floor_m);
        if too_close {
            continue;
        }
        eligible[i] = true;

        if let Some(nearest) = positive_tree.nearest(x, y) {
            if haversine_m(cand.position, positions[nearest.index]) <= config.outer_radius_m {
                clusters
                    .entry(positive_cells[nearest.index])
                    .or_default()
                    .push(i);
            }
        }
    }

    debug!(
        candidates = candidates.len(),
        eligible = eligible.iter().filter(|&&e| e).count(),
        cells = clusters.len(),
        "negative sampling pool prepared"
    );

    let candidate_tree = KdTree::build(&candidate_xy);
    let mut chosen = vec![false; candidates.len()];
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut per_cell: BTreeMap<Cell, (usize, usize)> = BTreeMap::new();

    for (p_idx, positive) in positives.iter().enumerate() {
        let cell = positive_cells[p_idx];
        for _ in 0..config.ratio {
            let tally = per_cell.entry(cell).or_insert((0, 0));
            tally.0 += 1;

            let open: Vec<usize> = clusters
                .get(&cell)
                .map(|members| members.iter().copied().filter(|&i| !chosen[i]).collect())
                .unwrap_or_default();

            let pick = if !open.is_empty() {
                Some((open[rng.gen_range(0..open.len())], false))
            } else {
                let [x, y] = positive_xy[p_idx];
                candidate_tree
                    .nearest_where(x, y, |i| eligible[i] && !chosen[i])
                    .map(|n| (n.index, true))
            };

            let Some((index, fallback)) = pick else {
                continue;
            };

            chosen[index] = true;
            tally.1 += 1;
            if fallback {
                outcome.fallback_draws += 1;
            }

            let pos = candidates.candidates[index].position;
            outcome.negatives.push(SampledNegative {
                point: RawPoint::new(pos.y(), pos.x(), Some(positive.date), Label::NonDam)
                    .with_source("sampled"),
                paired_with: positive.id.clone(),
                candidate: index,
                fallback,
            });
        }
    }

    outcome.shortfalls = per_cell
        .into_iter()
        .filter(|(_, (requested, drawn))| drawn < requested)
        .map(|(cell, (requested, drawn))| ClusterShortfall {
            cell,
            requested,
            drawn,
        })
        .collect();

    if !outcome.shortfalls.is_empty() {
        warn!(
            missing = outcome.missing(),
            cells = outcome.shortfalls.len(),
            "candidate pool exhausted before every positive was matched"
        );
    }

    outcome
}

/// Largest factor by which `proj` lengthens east-west distances near any of
/// `points`; at least 1.
fn max_stretch(proj: &LocalProjection, points: &[Point<f64>]) -> f64 {
    let cos_origin = proj.origin().y().to_radians().cos().abs().max(1e-6);
    points
        .iter()
        .map(|p| cos_origin / p.y().to_radians().cos().abs().max(1e-6))
        .fold(1.0, f64::max)
}
