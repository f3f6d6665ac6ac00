//! End-to-end run
//!
//! Standardize → sample negatives (when a candidate pool is given) → build
//! zones → split dam zones (when waterways are given) → scenes and metrics →
//! aggregate. Zone building and metric computation go through the batch
//! orchestrator; every other stage is local.

use std::collections::HashSet;

use geo::LineString;
use tracing::{info, warn};

use castor_algorithms::aggregate::{aggregate, compare};
use castor_algorithms::metrics::{compute_metrics_chunk, ZoneMetrics};
use castor_algorithms::sampling::{deduplicate, sample_negatives};
use castor_algorithms::zones::{build_zones, split_zone, validate_dams, DamPolicy};
use castor_core::record::check_unique;
use castor_core::{
    AnalysisZone, BackendError, BackendResult, CandidatePool, ComparisonPoint, Error, Label,
    MetricRecord, RasterBackend, RawPoint, SamplePoint, SceneRecord, SceneRequest, Standardizer,
    TimeSeriesPoint,
};
use castor_parallel::{run_batched, BatchOutcome};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::report::{
    ChunkFailure, ExcludedItem, Manifest, RejectedPoint, RunReport, SamplingDeficit, Stage,
};

/// Caller-owned inputs of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    /// Dam and control points as read from the input file
    pub points: Vec<RawPoint>,
    /// Pool negatives are drawn from; no sampling when absent
    pub candidates: Option<CandidatePool>,
    /// Waterway lines in flow direction; no upstream/downstream split when empty
    pub waterways: Vec<LineString<f64>>,
}

/// Everything a run produces.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Standardized points, sampled negatives included
    pub points: Vec<SamplePoint>,
    pub records: Vec<MetricRecord>,
    pub series: Vec<TimeSeriesPoint>,
    pub comparison: Vec<ComparisonPoint>,
    pub manifest: Manifest,
    pub report: RunReport,
}

type StageObserver<'a> = Box<dyn Fn(Stage) + Send + Sync + 'a>;

/// One configured run against one backend.
pub struct Pipeline<'a, B: RasterBackend> {
    config: PipelineConfig,
    backend: &'a B,
    observer: Option<StageObserver<'a>>,
}

impl<'a, B: RasterBackend> Pipeline<'a, B> {
    pub fn new(config: PipelineConfig, backend: &'a B) -> Self {
        Self {
            config,
            backend,
            observer: None,
        }
    }

    /// Call `f` whenever a stage starts.
    pub fn with_observer(mut self, f: impl Fn(Stage) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage.
    ///
    /// Only an invalid configuration or a fatal backend error fails the run;
    /// everything else ends up in the manifest.
    pub fn run(&self, input: &PipelineInput) -> Result<RunOutput> {
        self.config.validate()?;

        let mut out = RunOutput::default();
        out.report.input_points = input.points.len();

        self.enter(Stage::Standardize);
        let points = self.prepare_points(input, &mut out)?;

        self.enter(Stage::Zones);
        let zones_result = self.build_all_zones(&points, &mut out);
        out.points = points;
        let mut zones = zones_result?;

        if !input.waterways.is_empty() {
            self.enter(Stage::Split);
            let sub_zones = self.split_dam_zones(&zones, &input.waterways, &mut out.manifest);
            zones.extend(sub_zones);
        }

        self.enter(Stage::Metrics);
        out.records = self.compute_all_metrics(&zones, &mut out)?;
        check_unique(&out.records)?;

        self.enter(Stage::Aggregate);
        out.series = aggregate(&out.records, self.config.period);
        out.comparison = compare(&out.series);

        out.report.metric_records = out.records.len();
        out.report.chunk_failures = out.manifest.chunk_failures.len();
        info!(
            records = out.records.len(),
            series = out.series.len(),
            comparison = out.comparison.len(),
            "run complete"
        );
        Ok(out)
    }

    fn enter(&self, stage: Stage) {
        info!("{}", stage);
        if let Some(f) = &self.observer {
            f(stage);
        }
    }

    // ── Standardize and sample ──────────────────────────────────────

    fn prepare_points(&self, input: &PipelineInput, out: &mut RunOutput) -> Result<Vec<SamplePoint>> {
        let mut standardizer = Standardizer::new();
        if let Some(date) = self.config.fallback_date {
            standardizer = standardizer.with_fallback_date(date);
        }

        let mut dams = Vec::new();
        let mut controls = Vec::new();
        for (index, raw) in input.points.iter().enumerate() {
            match standardizer.validate(index, raw) {
                Ok(date) => {
                    let mut valid = raw.clone();
                    valid.date = Some(date);
                    match valid.label {
                        Label::Dam => dams.push(valid),
                        Label::NonDam => controls.push(valid),
                    }
                }
                Err(e) => {
                    warn!(index, error = %e, "input point rejected");
                    out.manifest.rejected.push(RejectedPoint {
                        reason: e.to_string(),
                    });
                }
            }
        }
        out.report.rejected_points = out.manifest.rejected.len();

        if self.config.dedup_radius_m > 0.0 {
            let (nd, nc) = (dams.len(), controls.len());
            dams = deduplicate(&dams, self.config.dedup_radius_m);
            controls = deduplicate(&controls, self.config.dedup_radius_m);
            let merged = nd + nc - dams.len() - controls.len();
            if merged > 0 {
                info!(merged, radius_m = self.config.dedup_radius_m, "merged near-duplicate points");
            }
        }

        let mut raw: Vec<RawPoint> = dams;
        raw.extend(controls);

        // Dam ids come from the order of dams alone, so they stay the same
        // once sampled negatives are appended to `raw`
        let mut positives: Vec<SamplePoint> = standardizer
            .standardize(&raw)
            .points
            .into_iter()
            .filter(|p| p.label == Label::Dam)
            .collect();

        let mut dropped: HashSet<String> = HashSet::new();
        if !input.waterways.is_empty() {
            self.enter(Stage::DamCheck);
            let check = &self.config.dam_check;
            for d in validate_dams(&positives, &input.waterways, check.max_distance_m)
                .into_iter()
                .filter(|d| !d.valid)
            {
                warn!(
                    point = %d.point_id,
                    distance_m = d.distance_m,
                    limit_m = check.max_distance_m,
                    "dam is far from every waterway"
                );
                out.manifest.off_waterway.push(ExcludedItem {
                    id: d.point_id.clone(),
                    reason: format!(
                        "{:.0} m from the nearest waterway (limit {} m)",
                        d.distance_m, check.max_distance_m
                    ),
                });
                if check.policy == DamPolicy::ValidOnly {
                    dropped.insert(d.point_id);
                }
            }
            out.report.dams_off_waterway = out.manifest.off_waterway.len();
            out.report.dams_dropped = dropped.len();
            positives.retain(|p| !dropped.contains(&p.id));
        }

        if let Some(pool) = &input.candidates {
            self.enter(Stage::Sampling);

            let outcome = sample_negatives(&positives, pool, &self.config.sampling);
            out.report.negatives_sampled = outcome.negatives.len();
            out.report.sampling_shortfall = outcome.missing();
            if outcome.missing() > 0 {
                let e = Error::SamplingShortfall {
                    requested: positives.len() * self.config.sampling.ratio,
                    missing: outcome.missing(),
                };
                warn!(error = %e, fallback_draws = outcome.fallback_draws, "sampling incomplete");
            }
            out.manifest.sampling_deficits = outcome
                .shortfalls
                .iter()
                .map(|s| SamplingDeficit {
                    cell: s.cell,
                    requested: s.requested,
                    drawn: s.drawn,
                })
                .collect();
            raw.extend(outcome.raw_points());
        }

        let mut standardized = standardizer.standardize(&raw);
        standardized
            .points
            .retain(|p| p.label != Label::Dam || !dropped.contains(&p.id));
        // Already validated; anything left here is a sampled point out of range
        for e in &standardized.rejected {
            out.manifest.rejected.push(RejectedPoint {
                reason: e.to_string(),
            });
        }
        out.report.rejected_points = out.manifest.rejected.len();

        info!(
            dams = standardized.points.iter().filter(|p| p.label == Label::Dam).count(),
            controls = standardized.points.iter().filter(|p| p.label == Label::NonDam).count(),
            "points standardized"
        );
        Ok(standardized.points)
    }

    // ── Zones ───────────────────────────────────────────────────────

    fn build_all_zones(&self, points: &[SamplePoint], out: &mut RunOutput) -> Result<Vec<AnalysisZone>> {
        let config = &self.config.zone;
        let outcome = run_batched(points, &self.config.batch, |chunk: &[SamplePoint]| {
            build_zones(chunk, self.backend, config)
        })?;

        record_failures(&outcome, Stage::Zones, |i| points[i].id.clone(), &mut out.manifest);

        let mut zones = Vec::new();
        for result in outcome.into_flat() {
            match result {
                Ok(zone) => zones.push(zone),
                Err(e) => {
                    let id = match &e {
                        Error::ElevationUnavailable { point_id } | Error::EmptyZone { point_id } => {
                            point_id.clone()
                        }
                        _ => String::new(),
                    };
                    if e.is_coverage() {
                        out.report.excluded_for_coverage += 1;
                    }
                    warn!(point = %id, error = %e, "point excluded");
                    out.manifest.coverage.push(ExcludedItem {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        out.report.zones_built = zones.len();
        info!(
            zones = zones.len(),
            excluded = out.report.excluded_for_coverage,
            "zones built"
        );
        Ok(zones)
    }

    fn split_dam_zones(
        &self,
        zones: &[AnalysisZone],
        waterways: &[LineString<f64>],
        manifest: &mut Manifest,
    ) -> Vec<AnalysisZone> {
        let mut sub_zones = Vec::new();
        for zone in zones.iter().filter(|z| z.point.label == Label::Dam) {
            match split_zone(zone, waterways, &self.config.flow_split) {
                Ok(split) => {
                    if split.upstream.is_none() && split.downstream.is_none() {
                        manifest.split.push(ExcludedItem {
                            id: zone.id.clone(),
                            reason: format!(
                                "no waterway within {} m",
                                self.config.flow_split.snap_distance_m
                            ),
                        });
                    }
                    sub_zones.extend(split.upstream);
                    sub_zones.extend(split.downstream);
                }
                Err(e) => {
                    warn!(zone = %zone.id, error = %e, "zone split failed");
                    manifest.split.push(ExcludedItem {
                        id: zone.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(sub_zones = sub_zones.len(), "dam zones split");
        sub_zones
    }

    // ── Metrics ─────────────────────────────────────────────────────

    fn scene_request(&self, zone: &AnalysisZone) -> SceneRequest {
        let (start, end) = self.config.window.range(zone.point.date);
        SceneRequest {
            grid: zone.grid,
            start,
            end,
            collections: self.config.collections.clone(),
            max_cloud_percent: self.config.metrics.cloud.max_scene_cloud_percent,
        }
    }

    /// Scenes and metrics for one chunk of zones: one scene search and at
    /// most one ET reduction.
    fn metrics_chunk(&self, chunk: &[AnalysisZone]) -> BackendResult<Vec<ZoneMetrics>> {
        let requests: Vec<SceneRequest> = chunk.iter().map(|z| self.scene_request(z)).collect();
        let scenes = self.backend.fetch_scenes(&requests)?;
        if scenes.len() != chunk.len() {
            return Err(BackendError::Protocol(format!(
                "scene search: expected {} entries, got {}",
                chunk.len(),
                scenes.len()
            )));
        }

        let items: Vec<(&AnalysisZone, &[SceneRecord])> = chunk
            .iter()
            .zip(&scenes)
            .map(|(zone, s)| (zone, s.as_slice()))
            .collect();
        compute_metrics_chunk(&items, self.backend, &self.config.metrics)
    }

    fn compute_all_metrics(&self, zones: &[AnalysisZone], out: &mut RunOutput) -> Result<Vec<MetricRecord>> {
        let outcome = run_batched(zones, &self.config.batch, |chunk: &[AnalysisZone]| {
            self.metrics_chunk(chunk)
        })?;

        record_failures(&outcome, Stage::Metrics, |i| zones[i].id.clone(), &mut out.manifest);

        let mut records = Vec::new();
        for metrics in outcome.into_flat() {
            out.report.scenes_considered += metrics.considered;
            out.report.excluded_for_cloud += metrics.excluded_cloud;
            records.extend(metrics.records);
        }

        info!(
            records = records.len(),
            scenes = out.report.scenes_considered,
            cloudy = out.report.excluded_for_cloud,
            "metrics computed"
        );
        Ok(records)
    }
}

fn record_failures<R>(
    outcome: &BatchOutcome<R>,
    stage: Stage,
    id_of: impl Fn(usize) -> String,
    manifest: &mut Manifest,
) {
    for failed in &outcome.failed {
        manifest.chunk_failures.push(ChunkFailure {
            stage,
            start: failed.start,
            end: failed.end,
            ids: (failed.start..failed.end).map(&id_of).collect(),
            error: failed.error.to_string(),
        });
    }
}
