//! CSV and JSON input/output for the command line

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use castor_core::sample::parse_coordinate;
use castor_core::{Candidate, CandidatePool, ComparisonPoint, Label, RawPoint, TimeSeriesPoint};
use castor_pipeline::RunOutput;

/// One row of a point file. Only the coordinates are required.
#[derive(Debug, Deserialize)]
struct PointRow {
    #[serde(alias = "lat", alias = "Latitude")]
    latitude: String,
    #[serde(alias = "lon", alias = "lng", alias = "Longitude")]
    longitude: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Read `latitude, longitude[, date][, label]` rows.
///
/// Unparseable coordinates become NaN so the standardizer rejects and
/// reports the record; a missing label means `dam`.
pub fn read_points(path: &Path) -> Result<Vec<RawPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut points = Vec::new();
    for (line, row) in reader.deserialize::<PointRow>().enumerate() {
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), line + 2))?;
        let label = match row.label.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s
                .parse::<Label>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{}: row {}", path.display(), line + 2))?,
            None => Label::Dam,
        };
        let date = match row.date.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(parse_date(s).with_context(|| format!("{}: row {}", path.display(), line + 2))?),
            None => None,
        };
        points.push(RawPoint::new(
            parse_coordinate(&row.latitude).unwrap_or(f64::NAN),
            parse_coordinate(&row.longitude).unwrap_or(f64::NAN),
            date,
            label,
        ));
    }
    Ok(points)
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD` and `DD/MM/YYYY`.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .with_context(|| format!("unrecognised date '{s}'"))
}

#[derive(Debug, Deserialize)]
struct CandidateRow {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
    #[serde(default)]
    excluded: bool,
}

/// Read a candidate pool from `latitude, longitude[, excluded]` rows.
pub fn read_candidates(path: &Path) -> Result<CandidatePool> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut candidates = Vec::new();
    for row in reader.deserialize::<CandidateRow>() {
        let row = row.with_context(|| format!("Failed to read {}", path.display()))?;
        candidates.push(Candidate {
            position: Point::new(row.longitude, row.latitude),
            excluded: row.excluded,
        });
    }
    Ok(CandidatePool::new(candidates))
}

#[derive(Debug, Deserialize)]
struct VertexRow {
    line: String,
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
}

/// Read waterway lines from `line, latitude, longitude` vertex rows.
///
/// Vertices of a line must be listed in flow direction; lines are returned
/// in order of first appearance.
pub fn read_waterways(path: &Path) -> Result<Vec<LineString<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut order: Vec<String> = Vec::new();
    let mut lines: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for row in reader.deserialize::<VertexRow>() {
        let row = row.with_context(|| format!("Failed to read {}", path.display()))?;
        if !lines.contains_key(&row.line) {
            order.push(row.line.clone());
        }
        lines
            .entry(row.line)
            .or_default()
            .push((row.longitude, row.latitude));
    }

    Ok(order
        .into_iter()
        .filter_map(|id| lines.remove(&id))
        .filter(|coords| coords.len() >= 2)
        .map(LineString::from)
        .collect())
}

#[derive(Serialize)]
struct PointOut<'a> {
    id: &'a str,
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
    label: Label,
    source: &'a str,
}

/// Write standardized points, ids included.
pub fn write_points(path: &Path, output: &RunOutput) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for p in &output.points {
        w.serialize(PointOut {
            id: &p.id,
            latitude: p.latitude,
            longitude: p.longitude,
            date: p.date,
            label: p.label,
            source: &p.source,
        })?;
    }
    w.flush()?;
    Ok(())
}

/// Write sampled negatives as an input-compatible point file.
pub fn write_raw_points(path: &Path, points: &[RawPoint]) -> Result<()> {
    #[derive(Serialize)]
    struct Row<'a> {
        latitude: f64,
        longitude: f64,
        date: Option<NaiveDate>,
        label: Label,
        source: &'a str,
    }

    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for p in points {
        w.serialize(Row {
            latitude: p.latitude,
            longitude: p.longitude,
            date: p.date,
            label: p.label,
            source: &p.source,
        })?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SeriesRow<'a> {
    zone_id: &'a str,
    label: Label,
    role: String,
    period: String,
    ndvi: f64,
    ndwi: f64,
    lst: Option<f64>,
    et: Option<f64>,
    records: usize,
}

pub fn write_series(path: &Path, series: &[TimeSeriesPoint]) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for s in series {
        w.serialize(SeriesRow {
            zone_id: &s.zone_id,
            label: s.label,
            role: s.role.to_string(),
            period: s.period.to_string(),
            ndvi: s.ndvi,
            ndwi: s.ndwi,
            lst: s.lst,
            et: s.et,
            records: s.records,
        })?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ComparisonRow {
    group: String,
    period: String,
    ndvi: f64,
    ndwi: f64,
    lst: Option<f64>,
    et: Option<f64>,
    zones: usize,
}

pub fn write_comparison(path: &Path, comparison: &[ComparisonPoint]) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for c in comparison {
        w.serialize(ComparisonRow {
            group: c.group.to_string(),
            period: c.period.to_string(),
            ndvi: c.ndvi,
            ndwi: c.ndwi,
            lst: c.lst,
            et: c.et,
            zones: c.zones,
        })?;
    }
    w.flush()?;
    Ok(())
}

/// Write the run report, the manifest and the effective configuration.
pub fn write_report(path: &Path, output: &RunOutput, config: &castor_pipeline::PipelineConfig) -> Result<()> {
    let doc = serde_json::json!({
        "report": output.report,
        "manifest": output.manifest,
        "config": config,
    });
    let text = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
