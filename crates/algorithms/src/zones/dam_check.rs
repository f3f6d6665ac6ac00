//! Dam location check against the waterway network
//!
//! A dam is plausible when it sits within `max_distance_m` of some waterway.
//! Points failing the check are either kept with a warning or dropped,
//! depending on [`DamPolicy`].

use geo::LineString;
use serde::{Deserialize, Serialize};

use castor_core::geodesy::{point_polyline_distance, LocalProjection};
use castor_core::SamplePoint;

/// What to do with dams far from every waterway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DamPolicy {
    /// Report them and keep analysing them
    #[default]
    KeepAll,
    /// Report them and leave them out of the run
    ValidOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamCheckConfig {
    pub max_distance_m: f64,
    pub policy: DamPolicy,
}

impl Default for DamCheckConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 50.0,
            policy: DamPolicy::KeepAll,
        }
    }
}

/// Distance from one dam to its nearest waterway.
#[derive(Debug, Clone, PartialEq)]
pub struct DamDistance {
    pub point_id: String,
    /// Infinite when there are no waterways
    pub distance_m: f64,
    pub valid: bool,
}

/// Check every point in `dams` against `waterways`, in input order.
pub fn validate_dams(
    dams: &[SamplePoint],
    waterways: &[LineString<f64>],
    max_distance_m: f64,
) -> Vec<DamDistance> {
    dams.iter()
        .map(|dam| {
            let proj = LocalProjection::new(dam.position());
            let distance_m = waterways
                .iter()
                .map(|line| {
                    let coords: Vec<(f64, f64)> = line.points().map(|p| proj.project(p)).collect();
                    point_polyline_distance((0.0, 0.0), &coords)
                })
                .fold(f64::INFINITY, f64::min);
            DamDistance {
                point_id: dam.id.clone(),
                distance_m,
                valid: distance_m <= max_distance_m,
            }
        })
        .collect()
}
