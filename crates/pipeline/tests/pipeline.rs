//! End-to-end runs against an in-memory raster service.

use std::sync::Mutex;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use geo::{LineString, Point};

use castor_algorithms::sampling::candidates_along;
use castor_algorithms::zones::DamPolicy;
use castor_core::geodesy::{haversine_m, meters_to_degrees};
use castor_core::{
    BackendError, BackendResult, ComparisonGroup, ElevationBackend, EtRequest,
    EvapotranspirationBackend, GridSpec, Label, PeriodKey, Raster, RawPoint, SceneBackend,
    SceneBands, SceneRecord, SceneRequest,
};
use castor_parallel::BatchAbort;
use castor_pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineInput, Stage};

const QA_CLOUD_AND_SNOW: u16 = (1 << 3) | (1 << 5);

/// Flat 1500 m valley with four scenes a year:
/// - 2020-07-01 and 2020-09-15 clear
/// - 2020-08-10 with every pixel QA-flagged but 0 % scene cloud cover
/// - 2020-10-01 with 60 % scene cloud cover
///
/// Points north of 60° have no DEM coverage. ET is 2.5 except in September.
#[derive(Default)]
struct FakeService {
    /// Scene searches with more requests than this fail with a capacity
    /// error when they include `poisoned`
    capacity_limit: Option<usize>,
    poisoned: Option<Point<f64>>,
    fatal_et: bool,
    calls: Mutex<Vec<(&'static str, usize)>>,
}

impl FakeService {
    fn log(&self, endpoint: &'static str, n: usize) {
        self.calls.lock().unwrap().push((endpoint, n));
    }

    fn calls_to(&self, endpoint: &str) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|&(_, n)| n)
            .collect()
    }

    fn covered(p: Point<f64>) -> bool {
        p.y() < 60.0
    }

    fn scene(grid: &GridSpec, id: &str, date: NaiveDate, cloud: f64, qa: u16) -> SceneRecord {
        let (rows, cols) = (grid.rows, grid.cols);
        let mut nir = Raster::new(rows, cols).with_transform(grid.transform);
        for row in 0..rows {
            for col in 0..cols {
                nir.set(row, col, 0.3 + 0.01 * col as f64).unwrap();
            }
        }
        let filled = |v: f64| Raster::filled(rows, cols, v).with_transform(grid.transform);
        SceneRecord {
            scene_id: id.to_string(),
            capture_date: date,
            cloud_fraction: cloud,
            bands: SceneBands {
                red: filled(0.1),
                green: filled(0.2),
                nir,
                thermal: filled(300.0),
                qa: Raster::filled(rows, cols, qa).with_transform(grid.transform),
            },
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

impl ElevationBackend for FakeService {
    fn sample_elevation(&self, points: &[Point<f64>]) -> BackendResult<Vec<Option<f64>>> {
        self.log("elevation:sample", points.len());
        Ok(points
            .iter()
            .map(|&p| Self::covered(p).then_some(1500.0))
            .collect())
    }

    fn elevation_grid(&self, grids: &[GridSpec]) -> BackendResult<Vec<Option<Raster<f64>>>> {
        self.log("elevation:grid", grids.len());
        Ok(grids
            .iter()
            .map(|g| Some(Raster::filled(g.rows, g.cols, 1500.0).with_transform(g.transform)))
            .collect())
    }
}

impl SceneBackend for FakeService {
    fn fetch_scenes(&self, requests: &[SceneRequest]) -> BackendResult<Vec<Vec<SceneRecord>>> {
        self.log("scenes:search", requests.len());

        if let (Some(limit), Some(poison)) = (self.capacity_limit, self.poisoned) {
            let hit = requests.iter().any(|r| {
                let c = r.grid.pixel_center(r.grid.rows / 2, r.grid.cols / 2);
                haversine_m(c, poison) < 1.0
            });
            if hit && requests.len() > limit {
                return Err(BackendError::Capacity("User memory limit exceeded".into()));
            }
        }

        let catalog = [
            ("LC08_A", date(2020, 7, 1), 0.0, 0u16),
            ("LC08_B", date(2020, 8, 10), 0.0, QA_CLOUD_AND_SNOW),
            ("LC08_C", date(2020, 9, 15), 5.0, 0),
            ("LC08_D", date(2020, 10, 1), 60.0, 0),
        ];
        Ok(requests
            .iter()
            .map(|r| {
                catalog
                    .iter()
                    .filter(|(_, d, _, _)| *d >= r.start && *d <= r.end)
                    .map(|&(id, d, cloud, qa)| Self::scene(&r.grid, id, d, cloud, qa))
                    .collect()
            })
            .collect())
    }
}

impl EvapotranspirationBackend for FakeService {
    fn reduce_et(&self, requests: &[EtRequest]) -> BackendResult<Vec<Option<f64>>> {
        self.log("et:reduce", requests.len());
        if self.fatal_et {
            return Err(BackendError::Fatal("project quota exhausted".into()));
        }
        Ok(requests
            .iter()
            .map(|r| (r.month != 9).then_some(2.5))
            .collect())
    }
}

/// `n` dams 0.01° apart along a meridian, dated 2020-07-01.
fn dams(n: usize) -> Vec<RawPoint> {
    (0..n)
        .map(|i| RawPoint::new(41.7 + 0.01 * i as f64, -111.8, Some(date(2020, 7, 1)), Label::Dam))
        .collect()
}

fn dam_position(i: usize) -> Point<f64> {
    Point::new(-111.8, 41.7 + 0.01 * i as f64)
}

fn input(points: Vec<RawPoint>) -> PipelineInput {
    PipelineInput {
        points,
        ..Default::default()
    }
}

#[test]
fn capacity_error_is_retried_on_halves() {
    let service = FakeService {
        capacity_limit: Some(5),
        // P12 sits in the second chunk
        poisoned: Some(dam_position(11)),
        ..Default::default()
    };
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(25)))
        .unwrap();

    assert_eq!(service.calls_to("elevation:sample"), vec![10, 10, 5]);
    assert_eq!(service.calls_to("scenes:search"), vec![10, 10, 5, 5, 5]);
    assert!(out.manifest.chunk_failures.is_empty());

    // Two clear scenes per zone
    assert_eq!(out.report.zones_built, 25);
    assert_eq!(out.report.metric_records, 50);
    let mut zones: Vec<_> = out.records.iter().map(|r| r.zone_id.as_str()).collect();
    zones.dedup();
    let expected: Vec<String> = (1..=25).map(|i| format!("P{i}")).collect();
    assert_eq!(zones, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn persistent_capacity_error_is_reported_not_fatal() {
    let service = FakeService {
        capacity_limit: Some(0),
        poisoned: Some(dam_position(11)),
        ..Default::default()
    };
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(25)))
        .unwrap();

    assert_eq!(out.manifest.chunk_failures.len(), 1);
    let failure = &out.manifest.chunk_failures[0];
    assert_eq!(failure.stage, Stage::Metrics);
    assert_eq!((failure.start, failure.end), (10, 15));
    assert_eq!(failure.ids, vec!["P11", "P12", "P13", "P14", "P15"]);
    assert_eq!(out.report.chunk_failures, 1);
    assert_eq!(out.report.metric_records, 40);
}

#[test]
fn fatal_backend_error_aborts_the_run() {
    let service = FakeService {
        fatal_et: true,
        ..Default::default()
    };
    let err = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(3)))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Aborted(BatchAbort::Fatal { .. })));
}

#[test]
fn qa_flagged_and_cloudy_scenes_are_excluded() {
    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(2)))
        .unwrap();

    assert_eq!(out.report.scenes_considered, 8);
    assert_eq!(out.report.excluded_for_cloud, 4);
    assert!(out.records.iter().all(|r| r.date != date(2020, 8, 10)));
    assert!(out.records.iter().all(|r| r.date != date(2020, 10, 1)));
}

#[test]
fn series_skips_empty_months() {
    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(1)))
        .unwrap();

    let periods: Vec<PeriodKey> = out.series.iter().map(|p| p.period).collect();
    assert_eq!(periods, vec![PeriodKey::month(2020, 7), PeriodKey::month(2020, 9)]);

    let july = &out.series[0];
    assert_eq!(july.et, Some(2.5));
    assert!(july.ndvi > 0.5 && july.ndvi < 1.0);
    assert!(july.ndwi < 0.0 && july.ndwi >= -1.0);
    let lst = july.lst.expect("LST from a varying NDVI field");
    assert!(lst > 25.0 && lst < 32.0, "{lst}");

    // No ET product for September: absent, not zero
    assert_eq!(out.series[1].et, None);
}

#[test]
fn batch_size_does_not_change_results() {
    let run = |batch_size: usize| {
        let mut config = PipelineConfig::default();
        config.batch.batch_size = batch_size;
        Pipeline::new(config, &FakeService::default())
            .run(&input(dams(7)))
            .unwrap()
            .records
    };
    let unbatched = run(100);
    assert_eq!(run(1), unbatched);
    assert_eq!(run(3), unbatched);
}

#[test]
fn parallel_chunks_match_sequential() {
    let mut config = PipelineConfig::default();
    config.batch.batch_size = 2;
    let sequential = Pipeline::new(config.clone(), &FakeService::default())
        .run(&input(dams(9)))
        .unwrap();

    config.batch.parallelism = 4;
    let parallel = Pipeline::new(config, &FakeService::default())
        .run(&input(dams(9)))
        .unwrap();

    assert_eq!(parallel.records, sequential.records);
    assert_eq!(parallel.series.len(), sequential.series.len());
}

#[test]
fn zones_have_the_configured_band_and_radius() {
    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(dams(3)))
        .unwrap();
    assert_eq!(out.report.zones_built, 3);
    for r in &out.records {
        assert!((-1.0..=1.0).contains(&r.ndvi));
        assert!((-1.0..=1.0).contains(&r.ndwi));
        assert_eq!(r.clamped_pixels, 0);
    }
}

#[test]
fn invalid_and_uncovered_points_end_up_in_the_manifest() {
    let mut points = dams(3);
    points.insert(1, RawPoint::new(95.0, -111.8, Some(date(2020, 7, 1)), Label::Dam));
    points.push(RawPoint::new(65.0, -150.0, Some(date(2020, 7, 1)), Label::Dam));

    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(points))
        .unwrap();

    assert_eq!(out.report.input_points, 5);
    assert_eq!(out.report.rejected_points, 1);
    // Rejected records take no id
    let ids: Vec<_> = out.points.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);

    assert_eq!(out.report.excluded_for_coverage, 1);
    assert_eq!(out.manifest.coverage[0].id, "P4");
    assert_eq!(out.report.zones_built, 3);
}

#[test]
fn missing_dates_take_the_fallback() {
    let points = vec![RawPoint::new(41.7, -111.8, None, Label::Dam)];
    let service = FakeService::default();

    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&input(points.clone()))
        .unwrap();
    assert_eq!(out.report.rejected_points, 1);

    let config = PipelineConfig {
        fallback_date: Some(date(2020, 7, 1)),
        ..Default::default()
    };
    let out = Pipeline::new(config, &service).run(&input(points)).unwrap();
    assert_eq!(out.points[0].date, date(2020, 7, 1));
    assert_eq!(out.report.metric_records, 2);
}

#[test]
fn sampled_negatives_respect_the_floor_and_form_a_control_group() {
    // A channel 300 m east of the dams, densified every 100 m
    let (dlon, _) = meters_to_degrees(300.0, 41.72);
    let channel = LineString::from(vec![(-111.8 + dlon, 41.69), (-111.8 + dlon, 41.75)]);
    let pool = candidates_along(&[channel], 100.0);

    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&PipelineInput {
            points: dams(5),
            candidates: Some(pool),
            waterways: Vec::new(),
        })
        .unwrap();

    assert_eq!(out.report.negatives_sampled, 5);
    assert_eq!(out.report.sampling_shortfall, 0);

    let negatives: Vec<_> = out.points.iter().filter(|p| p.label == Label::NonDam).collect();
    assert_eq!(
        negatives.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
        vec!["N1", "N2", "N3", "N4", "N5"]
    );
    for n in &negatives {
        assert_eq!(n.source, "sampled");
        assert_eq!(n.date, date(2020, 7, 1));
        for i in 0..5 {
            assert!(haversine_m(n.position(), dam_position(i)) >= 200.0);
        }
    }

    let groups: Vec<_> = out.comparison.iter().map(|c| c.group).collect();
    assert!(groups.contains(&ComparisonGroup::Dam));
    assert!(groups.contains(&ComparisonGroup::NonDam));
    let july_dam = out
        .comparison
        .iter()
        .find(|c| c.group == ComparisonGroup::Dam && c.period == PeriodKey::month(2020, 7))
        .unwrap();
    assert_eq!(july_dam.zones, 5);
}

/// North-to-south stream through the first dam of [`dams`].
fn stream_through_first_dam() -> LineString<f64> {
    let (_, dlat) = meters_to_degrees(50.0, 41.7);
    LineString::from(
        (-6..=6)
            .rev()
            .map(|i| (-111.8, 41.7 + dlat * i as f64))
            .collect::<Vec<_>>(),
    )
}

#[test]
fn dams_far_from_waterways_are_reported_or_dropped() {
    let run = |policy: DamPolicy| {
        let mut config = PipelineConfig::default();
        config.dam_check.policy = policy;
        Pipeline::new(config, &FakeService::default())
            .run(&PipelineInput {
                points: dams(3),
                candidates: None,
                waterways: vec![stream_through_first_dam()],
            })
            .unwrap()
    };

    // P2 and P3 are 1.1 km and 2.2 km from the stream
    let kept = run(DamPolicy::KeepAll);
    let off: Vec<_> = kept.manifest.off_waterway.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(off, vec!["P2", "P3"]);
    assert_eq!(kept.report.dams_off_waterway, 2);
    assert_eq!(kept.report.dams_dropped, 0);
    assert_eq!(kept.points.len(), 3);
    assert_eq!(kept.report.zones_built, 3);

    let valid = run(DamPolicy::ValidOnly);
    assert_eq!(valid.manifest.off_waterway.len(), 2);
    assert_eq!(valid.report.dams_off_waterway, 2);
    assert_eq!(valid.report.dams_dropped, 2);
    let ids: Vec<_> = valid.points.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["P1"]);
    assert_eq!(valid.report.zones_built, 1);
    assert!(valid.records.iter().all(|r| r.zone_id.starts_with("P1")));
}

#[test]
fn without_waterways_no_dam_is_checked() {
    let mut config = PipelineConfig::default();
    config.dam_check.policy = DamPolicy::ValidOnly;
    let out = Pipeline::new(config, &FakeService::default())
        .run(&input(dams(2)))
        .unwrap();
    assert!(out.manifest.off_waterway.is_empty());
    assert_eq!(out.points.len(), 2);
}

#[test]
fn waterways_add_upstream_and_downstream_groups() {
    let stream = stream_through_first_dam();

    let service = FakeService::default();
    let out = Pipeline::new(PipelineConfig::default(), &service)
        .run(&PipelineInput {
            points: dams(2),
            candidates: None,
            waterways: vec![stream],
        })
        .unwrap();

    let zone_ids: Vec<_> = {
        let mut ids: Vec<_> = out.series.iter().map(|s| s.zone_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    };
    assert_eq!(zone_ids, vec!["P1", "P1-down", "P1-up", "P2"]);

    // P2 is 1.1 km away from the stream
    assert_eq!(out.manifest.split.len(), 1);
    assert_eq!(out.manifest.split[0].id, "P2");

    let groups: Vec<_> = out.comparison.iter().map(|c| c.group).collect();
    assert!(groups.contains(&ComparisonGroup::Upstream));
    assert!(groups.contains(&ComparisonGroup::Downstream));

    let up = out
        .comparison
        .iter()
        .find(|c| c.group == ComparisonGroup::Upstream)
        .unwrap();
    assert_eq!(up.zones, 1);
    // Strip centred on the stream column, where NIR is 0.35
    assert_relative_eq!(up.ndwi, -0.272, epsilon = 0.01);
}
