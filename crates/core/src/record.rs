//! Scene, metric and time-series records

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::Raster;
use crate::sample::Label;
use crate::zone::ZoneRole;

/// Surface reflectance and brightness temperature bands on a zone grid.
///
/// Optical bands are unitless reflectance, `thermal` is in Kelvin, `qa` is
/// the raw pixel quality bitfield.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBands {
    pub red: Raster<f64>,
    pub green: Raster<f64>,
    pub nir: Raster<f64>,
    pub thermal: Raster<f64>,
    pub qa: Raster<u16>,
}

impl SceneBands {
    /// Fail unless every band has the same shape.
    pub fn check_shapes(&self) -> Result<()> {
        self.red.check_same_shape(&self.green)?;
        self.red.check_same_shape(&self.nir)?;
        self.red.check_same_shape(&self.thermal)?;
        self.red.check_same_shape(&self.qa)?;
        Ok(())
    }

    pub fn shape(&self) -> (usize, usize) {
        self.red.shape()
    }
}

/// One satellite acquisition clipped to a zone grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub scene_id: String,
    pub capture_date: NaiveDate,
    /// Scene-level cloud cover in percent (0..=100)
    pub cloud_fraction: f64,
    pub bands: SceneBands,
}

/// Metrics of one zone for one surviving scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub zone_id: String,
    pub point_id: String,
    pub label: Label,
    pub role: ZoneRole,
    pub date: NaiveDate,
    pub ndvi: f64,
    pub ndwi: f64,
    /// Mean land surface temperature in °C
    pub lst: Option<f64>,
    /// Monthly evapotranspiration from the ET product
    pub et: Option<f64>,
    /// Pixels whose NDVI or NDWI fell outside [-1, 1] and were clamped
    pub clamped_pixels: usize,
}

/// Reject a second record for the same (zone, date).
pub fn check_unique(records: &[MetricRecord]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for r in records {
        if !seen.insert((r.zone_id.as_str(), r.date)) {
            return Err(Error::DuplicateRecord {
                zone_id: r.zone_id.clone(),
                date: r.date,
            });
        }
    }
    Ok(())
}

/// Bucket width of a time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPeriod {
    #[default]
    Month,
    Year,
}

impl AggregationPeriod {
    /// Period `date` falls in.
    pub fn key(self, date: NaiveDate) -> PeriodKey {
        match self {
            Self::Month => PeriodKey::month(date.year(), date.month()),
            Self::Year => PeriodKey::year(date.year()),
        }
    }
}

/// A calendar month or year. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    /// `None` for yearly buckets
    pub month: Option<u32>,
}

impl PeriodKey {
    pub fn month(year: i32, month: u32) -> Self {
        Self {
            year,
            month: Some(month),
        }
    }

    pub fn year(year: i32) -> Self {
        Self { year, month: None }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(m) => write!(f, "{}-{:02}", self.year, m),
            None => write!(f, "{}", self.year),
        }
    }
}

/// Mean metrics of one zone over one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub zone_id: String,
    pub label: Label,
    pub role: ZoneRole,
    pub period: PeriodKey,
    pub ndvi: f64,
    pub ndwi: f64,
    pub lst: Option<f64>,
    pub et: Option<f64>,
    /// Number of metric records averaged
    pub records: usize,
}

/// Series a comparison point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonGroup {
    Dam,
    NonDam,
    Upstream,
    Downstream,
}

impl fmt::Display for ComparisonGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dam => f.write_str("dam"),
            Self::NonDam => f.write_str("non-dam"),
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

/// Mean over all zones of one group in one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonPoint {
    pub group: ComparisonGroup,
    pub period: PeriodKey,
    pub ndvi: f64,
    pub ndwi: f64,
    pub lst: Option<f64>,
    pub et: Option<f64>,
    /// Number of zones contributing
    pub zones: usize,
}
