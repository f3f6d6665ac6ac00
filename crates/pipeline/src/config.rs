//! Run configuration
//!
//! Every tunable of a run lives in one [`PipelineConfig`]. All sections
//! default to the values the analysis was calibrated with, so a JSON file
//! only needs the fields it changes.

use std::path::Path;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use castor_algorithms::metrics::MetricConfig;
use castor_algorithms::sampling::{SamplingConfig, DEDUP_RADIUS_M};
use castor_algorithms::zones::{DamCheckConfig, FlowSplitConfig, ZoneConfig};
use castor_core::AggregationPeriod;
use castor_parallel::BatchOptions;

use crate::error::{PipelineError, Result};

/// Date range of scenes requested around a point's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneWindow {
    pub months_before: u32,
    pub months_after: u32,
}

impl Default for SceneWindow {
    fn default() -> Self {
        Self {
            months_before: 6,
            months_after: 6,
        }
    }
}

impl SceneWindow {
    /// Inclusive `(start, end)` around `date`.
    ///
    /// Ends falling outside chrono's calendar are pinned to `date`.
    pub fn range(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = date
            .checked_sub_months(Months::new(self.months_before))
            .unwrap_or(date);
        let end = date
            .checked_add_months(Months::new(self.months_after))
            .unwrap_or(date);
        (start, end)
    }
}

/// Complete configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input points of the same label closer than this are merged (0 disables)
    pub dedup_radius_m: f64,
    /// Date assigned to input points without one
    pub fallback_date: Option<NaiveDate>,
    /// Dam distance check, run when waterways are supplied
    pub dam_check: DamCheckConfig,
    pub sampling: SamplingConfig,
    pub zone: ZoneConfig,
    pub flow_split: FlowSplitConfig,
    /// Chunking of zone building and metric computation
    pub batch: BatchOptions,
    pub window: SceneWindow,
    /// Image collections searched for scenes
    pub collections: Vec<String>,
    pub metrics: MetricConfig,
    pub period: AggregationPeriod,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup_radius_m: DEDUP_RADIUS_M,
            fallback_date: None,
            dam_check: DamCheckConfig::default(),
            sampling: SamplingConfig::default(),
            zone: ZoneConfig::default(),
            flow_split: FlowSplitConfig::default(),
            batch: BatchOptions::default(),
            window: SceneWindow::default(),
            collections: vec![
                "LANDSAT/LC08/C02/T1_L2".to_string(),
                "LANDSAT/LC09/C02/T1_L2".to_string(),
            ],
            metrics: MetricConfig::default(),
            period: AggregationPeriod::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| PipelineError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can succeed with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &'static str, value: String, reason: &str| {
            Err(PipelineError::Core(castor_core::Error::InvalidParameter {
                name,
                value,
                reason: reason.to_string(),
            }))
        };

        if self.zone.radius_m.is_nan() || self.zone.radius_m <= 0.0 {
            return invalid("zone.radius_m", self.zone.radius_m.to_string(), "must be positive");
        }
        if self.zone.scale_m.is_nan() || self.zone.scale_m <= 0.0 {
            return invalid("zone.scale_m", self.zone.scale_m.to_string(), "must be positive");
        }
        if self.zone.elevation_tolerance_m.is_nan() || self.zone.elevation_tolerance_m < 0.0 {
            return invalid(
                "zone.elevation_tolerance_m",
                self.zone.elevation_tolerance_m.to_string(),
                "must not be negative",
            );
        }
        if self.batch.batch_size == 0 {
            return invalid("batch.batch_size", "0".into(), "must be at least 1");
        }
        if self.collections.is_empty() {
            return invalid("collections", "[]".into(), "at least one collection is required");
        }
        if self.dam_check.max_distance_m.is_nan() || self.dam_check.max_distance_m < 0.0 {
            return invalid(
                "dam_check.max_distance_m",
                self.dam_check.max_distance_m.to_string(),
                "must not be negative",
            );
        }
        if self.dedup_radius_m < 0.0 {
            return invalid("dedup_radius_m", self.dedup_radius_m.to_string(), "must not be negative");
        }
        Ok(())
    }
}
