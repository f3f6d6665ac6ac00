//! Metric computation for analysis zones

mod engine;

pub use engine::{compute_metrics, compute_metrics_chunk, dedupe_scenes, MetricConfig, ZoneMetrics};
