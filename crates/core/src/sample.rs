//! Sample points, candidate pools and the standardizer
//!
//! The standardizer is the only place identifiers are assigned: dams get
//! `P1..Pn`, non-dams `N1..Nn`, numbered in input order within each label.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use geo::Point;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether a point is a beaver dam or a control location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Dam,
    NonDam,
}

impl Label {
    /// Identifier prefix for this label namespace.
    pub fn prefix(self) -> char {
        match self {
            Self::Dam => 'P',
            Self::NonDam => 'N',
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dam => f.write_str("dam"),
            Self::NonDam => f.write_str("non-dam"),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dam" | "positive" | "p" | "1" | "true" | "yes" => Ok(Self::Dam),
            "non-dam" | "nondam" | "non_dam" | "negative" | "n" | "0" | "false" | "no" => {
                Ok(Self::NonDam)
            }
            other => Err(format!("unknown label '{other}'")),
        }
    }
}

/// A validated, identified point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// `P#` or `N#`, unique within the label namespace
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Survey date the point's time window is centred on
    pub date: NaiveDate,
    pub label: Label,
    /// Where the point came from (`upload`, `sampled`, a file name, ...)
    pub source: String,
}

impl SamplePoint {
    /// Position as a (lon, lat) point
    pub fn position(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// A point as supplied by a parser, before validation and numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub date: Option<NaiveDate>,
    pub label: Label,
    pub source: String,
}

impl RawPoint {
    pub fn new(latitude: f64, longitude: f64, date: Option<NaiveDate>, label: Label) -> Self {
        Self {
            latitude,
            longitude,
            date,
            label,
            source: "upload".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Output of [`Standardizer::standardize`].
#[derive(Debug, Clone, Default)]
pub struct Standardized {
    pub points: Vec<SamplePoint>,
    /// One validation error per rejected input record
    pub rejected: Vec<Error>,
}

/// Validates raw points and assigns sequential per-label identifiers.
#[derive(Debug, Clone, Default)]
pub struct Standardizer {
    /// Date used for records that carry none
    pub fallback_date: Option<NaiveDate>,
}

impl Standardizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback_date(mut self, date: NaiveDate) -> Self {
        self.fallback_date = Some(date);
        self
    }

    /// Validate every record and number the survivors.
    ///
    /// Invalid records are reported in `rejected` and do not consume an
    /// identifier, so ids stay gap-free.
    pub fn standardize(&self, raw: &[RawPoint]) -> Standardized {
        let mut out = Standardized::default();
        let mut next_dam = 1usize;
        let mut next_non_dam = 1usize;

        for (index, r) in raw.iter().enumerate() {
            let date = match self.validate(index, r) {
                Ok(date) => date,
                Err(e) => {
                    out.rejected.push(e);
                    continue;
                }
            };

            let counter = match r.label {
                Label::Dam => &mut next_dam,
                Label::NonDam => &mut next_non_dam,
            };
            let id = format!("{}{}", r.label.prefix(), *counter);
            *counter += 1;

            out.points.push(SamplePoint {
                id,
                latitude: r.latitude,
                longitude: r.longitude,
                date,
                label: r.label,
                source: r.source.clone(),
            });
        }

        out
    }

    /// Check coordinates and resolve the record's date.
    pub fn validate(&self, index: usize, r: &RawPoint) -> Result<NaiveDate> {
        validate_coordinates(index, r.latitude, r.longitude)?;
        r.date.or(self.fallback_date).ok_or_else(|| Error::Validation {
            index,
            field: "date",
            value: "<missing>".to_string(),
            reason: "no date and no fallback date configured".to_string(),
        })
    }
}

/// Reject non-finite or out-of-range WGS84 coordinates.
pub fn validate_coordinates(index: usize, latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Validation {
            index,
            field: "latitude",
            value: latitude.to_string(),
            reason: "must be a finite value in [-90, 90]".to_string(),
        });
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Validation {
            index,
            field: "longitude",
            value: longitude.to_string(),
            reason: "must be a finite value in [-180, 180]".to_string(),
        });
    }
    Ok(())
}

/// Parse a coordinate as typed by people: `41.5`, `41,5`, `41.5°N`, `111.8 W`.
///
/// Southern and western hemisphere suffixes negate the value.
pub fn parse_coordinate(value: &str) -> Option<f64> {
    let mut s = value.trim().replace('°', "").replace(',', ".");
    let mut sign = 1.0;
    if let Some(last) = s.chars().last() {
        match last.to_ascii_uppercase() {
            'N' | 'E' => {
                s.pop();
            }
            'S' | 'W' => {
                s.pop();
                sign = -1.0;
            }
            _ => {}
        }
    }
    s.trim().parse::<f64>().ok().map(|v| v * sign)
}

/// One eligible control location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub position: Point<f64>,
    /// Set when a prior step ruled this location out
    pub excluded: bool,
}

impl Candidate {
    pub fn new(position: Point<f64>) -> Self {
        Self {
            position,
            excluded: false,
        }
    }
}

/// Pool of candidate control locations, typically points along waterways.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    pub candidates: Vec<Candidate>,
}

impl CandidatePool {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point<f64>>) -> Self {
        Self::new(points.into_iter().map(Candidate::new).collect())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Number of candidates not flagged as excluded
    pub fn eligible_count(&self) -> usize {
        self.candidates.iter().filter(|c| !c.excluded).count()
    }
}
