//! Run manifest and summary report

use std::fmt;

use serde::Serialize;

/// Pipeline stage a chunk failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Standardize,
    DamCheck,
    Sampling,
    Zones,
    Split,
    Metrics,
    Aggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standardize => "standardizing points",
            Self::DamCheck => "checking dams against waterways",
            Self::Sampling => "sampling negatives",
            Self::Zones => "building zones",
            Self::Split => "splitting zones along waterways",
            Self::Metrics => "computing metrics",
            Self::Aggregate => "aggregating",
        };
        f.write_str(s)
    }
}

/// An input record that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedPoint {
    pub reason: String,
}

/// A point or zone left out of the analysis, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedItem {
    pub id: String,
    pub reason: String,
}

/// Items of a chunk that failed even after splitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub stage: Stage,
    pub start: usize,
    pub end: usize,
    /// Point or zone ids covered by the chunk
    pub ids: Vec<String>,
    pub error: String,
}

/// Negative sampling deficit of one stratification cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingDeficit {
    pub cell: (i64, i64),
    pub requested: usize,
    pub drawn: usize,
}

/// Everything that did not make it into the results, and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manifest {
    pub rejected: Vec<RejectedPoint>,
    /// Dams farther than the allowed distance from every waterway
    pub off_waterway: Vec<ExcludedItem>,
    pub sampling_deficits: Vec<SamplingDeficit>,
    /// Points without elevation coverage or with an empty zone
    pub coverage: Vec<ExcludedItem>,
    /// Dam zones that could not be split
    pub split: Vec<ExcludedItem>,
    pub chunk_failures: Vec<ChunkFailure>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.rejected.is_empty()
            && self.off_waterway.is_empty()
            && self.sampling_deficits.is_empty()
            && self.coverage.is_empty()
            && self.split.is_empty()
            && self.chunk_failures.is_empty()
    }
}

/// Counts reported at the end of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub input_points: usize,
    pub rejected_points: usize,
    /// Dams failing the waterway distance check, kept or not
    pub dams_off_waterway: usize,
    /// Of those, dams left out of the run
    pub dams_dropped: usize,
    pub negatives_sampled: usize,
    /// Negatives requested but not drawn
    pub sampling_shortfall: usize,
    pub zones_built: usize,
    pub excluded_for_coverage: usize,
    pub scenes_considered: usize,
    pub excluded_for_cloud: usize,
    pub metric_records: usize,
    pub chunk_failures: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Input points:        {}", self.input_points)?;
        writeln!(f, "  Rejected:            {}", self.rejected_points)?;
        writeln!(
            f,
            "  Off waterway:        {} ({} dropped)",
            self.dams_off_waterway, self.dams_dropped
        )?;
        writeln!(
            f,
            "  Negatives sampled:   {} (shortfall {})",
            self.negatives_sampled, self.sampling_shortfall
        )?;
        writeln!(
            f,
            "  Zones built:         {} ({} without coverage)",
            self.zones_built, self.excluded_for_coverage
        )?;
        writeln!(
            f,
            "  Scenes considered:   {} ({} cloudy)",
            self.scenes_considered, self.excluded_for_cloud
        )?;
        writeln!(f, "  Metric records:      {}", self.metric_records)?;
        write!(f, "  Failed chunks:       {}", self.chunk_failures)
    }
}
