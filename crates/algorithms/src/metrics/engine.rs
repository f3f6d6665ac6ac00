//! Per-zone metric records
//!
//! For every zone of a chunk: drop same-day duplicate scenes, screen the rest
//! against the cloud filter, reduce NDVI / NDWI / LST over the zone mask, and
//! finally look up monthly ET for all surviving (zone, month) pairs with one
//! backend call for the whole chunk.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use castor_core::{
    AnalysisZone, BackendError, BackendResult, EtRequest, EvapotranspirationBackend,
    MetricRecord, SceneRecord,
};

use crate::imagery::{land_surface_temperature, ndvi, ndwi, CloudFilter, LstParams, SceneVerdict};
use crate::statistics::masked_mean;

/// Metric engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    pub cloud: CloudFilter,
    pub lst: LstParams,
    /// Look up monthly ET for every record
    pub include_et: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            cloud: CloudFilter::default(),
            lst: LstParams::default(),
            include_et: true,
        }
    }
}

/// Metric records of one zone plus screening counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneMetrics {
    pub records: Vec<MetricRecord>,
    /// Scenes offered for this zone, before deduplication
    pub considered: usize,
    /// Same-day scenes dropped in favour of a clearer one
    pub duplicates: usize,
    /// Scenes rejected by cloud cover or QA flags
    pub excluded_cloud: usize,
    /// Scenes without a single valid index pixel in the zone
    pub empty: usize,
}

/// Keep one scene per capture date: the one with the lowest cloud fraction.
///
/// Ties go to the scene listed first. Output is ordered by date.
pub fn dedupe_scenes(scenes: &[SceneRecord]) -> Vec<&SceneRecord> {
    let mut by_date: BTreeMap<NaiveDate, &SceneRecord> = BTreeMap::new();
    for scene in scenes {
        by_date
            .entry(scene.capture_date)
            .and_modify(|kept| {
                if scene.cloud_fraction < kept.cloud_fraction {
                    *kept = scene;
                }
            })
            .or_insert(scene);
    }
    by_date.into_values().collect()
}

/// Metrics for a single zone.
pub fn compute_metrics(
    zone: &AnalysisZone,
    scenes: &[SceneRecord],
    et: &dyn EvapotranspirationBackend,
    config: &MetricConfig,
) -> BackendResult<ZoneMetrics> {
    let mut out = compute_metrics_chunk(&[(zone, scenes)], et, config)?;
    Ok(out.pop().unwrap_or_default())
}

/// Metrics for a chunk of zones, with at most one ET backend call.
///
/// Results are in input order. A band whose shape does not match the zone
/// grid is reported as a protocol error for the whole chunk.
pub fn compute_metrics_chunk(
    items: &[(&AnalysisZone, &[SceneRecord])],
    et: &dyn EvapotranspirationBackend,
    config: &MetricConfig,
) -> BackendResult<Vec<ZoneMetrics>> {
    let mut results = Vec::with_capacity(items.len());
    for (zone, scenes) in items {
        results.push(zone_records(zone, scenes, config)?);
    }

    if config.include_et {
        attach_et(items, &mut results, et)?;
    }

    debug!(
        zones = items.len(),
        records = results.iter().map(|r| r.records.len()).sum::<usize>(),
        "metric chunk computed"
    );
    Ok(results)
}

fn zone_records(
    zone: &AnalysisZone,
    scenes: &[SceneRecord],
    config: &MetricConfig,
) -> BackendResult<ZoneMetrics> {
    let protocol = |e: castor_core::Error| {
        BackendError::Protocol(format!("scene bands for zone {}: {e}", zone.id))
    };

    let kept = dedupe_scenes(scenes);
    let mut out = ZoneMetrics {
        considered: scenes.len(),
        duplicates: scenes.len() - kept.len(),
        ..Default::default()
    };

    for scene in kept {
        scene.bands.check_shapes().map_err(protocol)?;
        scene.bands.red.check_same_shape(&zone.mask).map_err(protocol)?;

        let verdict = config.cloud.assess(scene, &zone.mask).map_err(protocol)?;
        match verdict {
            SceneVerdict::Clear => {}
            SceneVerdict::CloudCover | SceneVerdict::QaFlagged => {
                trace!(zone = %zone.id, scene = %scene.scene_id, ?verdict, "scene excluded");
                out.excluded_cloud += 1;
                continue;
            }
            SceneVerdict::Empty => {
                out.empty += 1;
                continue;
            }
        }

        let b = &scene.bands;
        let veg = ndvi(&b.nir, &b.red).map_err(protocol)?;
        let water = ndwi(&b.green, &b.nir).map_err(protocol)?;

        let (Some(ndvi_mean), Some(ndwi_mean)) = (
            masked_mean(&veg.values, &zone.mask).map_err(protocol)?,
            masked_mean(&water.values, &zone.mask).map_err(protocol)?,
        ) else {
            out.empty += 1;
            continue;
        };

        let lst = match land_surface_temperature(&b.thermal, &veg.values, &zone.mask, &config.lst)
            .map_err(protocol)?
        {
            Some(raster) => masked_mean(&raster, &zone.mask).map_err(protocol)?,
            None => None,
        };

        let clamped = veg.clamped_within(&zone.mask).map_err(protocol)?
            + water.clamped_within(&zone.mask).map_err(protocol)?;

        out.records.push(MetricRecord {
            zone_id: zone.id.clone(),
            point_id: zone.point.id.clone(),
            label: zone.point.label,
            role: zone.role,
            date: scene.capture_date,
            ndvi: ndvi_mean,
            ndwi: ndwi_mean,
            lst,
            et: None,
            clamped_pixels: clamped,
        });
    }

    Ok(out)
}

/// One `reduce_et` call for every distinct (zone, year, month) of the chunk.
fn attach_et(
    items: &[(&AnalysisZone, &[SceneRecord])],
    results: &mut [ZoneMetrics],
    et: &dyn EvapotranspirationBackend,
) -> BackendResult<()> {
    let mut slots: BTreeMap<(usize, i32, u32), usize> = BTreeMap::new();
    let mut requests = Vec::new();

    for (zi, metrics) in results.iter().enumerate() {
        let zone = items[zi].0;
        for record in &metrics.records {
            let key = (zi, record.date.year(), record.date.month());
            slots.entry(key).or_insert_with(|| {
                requests.push(EtRequest {
                    grid: zone.grid,
                    mask: zone.mask.clone(),
                    year: key.1,
                    month: key.2,
                });
                requests.len() - 1
            });
        }
    }

    if requests.is_empty() {
        return Ok(());
    }

    let values = et.reduce_et(&requests)?;
    if values.len() != requests.len() {
        return Err(BackendError::Protocol(format!(
            "ET reduction: expected {} values, got {}",
            requests.len(),
            values.len()
        )));
    }

    for (zi, metrics) in results.iter_mut().enumerate() {
        for record in metrics.records.iter_mut() {
            let key = (zi, record.date.year(), record.date.month());
            record.et = slots
                .get(&key)
                .and_then(|&slot| values[slot])
                .filter(|v| v.is_finite());
        }
    }
    Ok(())
}
