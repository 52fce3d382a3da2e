use std::cell::Cell;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zoneguard_core::BoundingBox;
use zoneguard_core::geometry::close_ring;

use super::*;
use crate::element::ElementKind;
use crate::fetch::{FetcherConfig, RetryPolicy, TileCache};
use crate::test_support::{
    RecordingSink, StubFeatureSource, block_on_for_tests, military_square, tags,
};

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn progress(&self) -> ProgressStore {
        ProgressStore::new(self.root.join("progress.json"))
    }

    fn cache(&self) -> TileCache {
        TileCache::new(self.root.join("tiles"))
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    Workspace { _dir: dir, root }
}

fn district(key: &str, min_lon: f64) -> District {
    let bbox = BoundingBox::new(min_lon, 55.0, min_lon + 1.0, 55.5).expect("bbox");
    District::new(key, key.to_uppercase(), bbox)
}

fn pipeline(
    source: StubFeatureSource,
    sink: RecordingSink,
    workspace: &Workspace,
) -> IngestPipeline<StubFeatureSource, RecordingSink> {
    pipeline_with(
        FetcherConfig::default().with_request_delay(Duration::ZERO),
        source,
        sink,
        workspace,
    )
}

fn pipeline_with(
    config: FetcherConfig,
    source: StubFeatureSource,
    sink: RecordingSink,
    workspace: &Workspace,
) -> IngestPipeline<StubFeatureSource, RecordingSink> {
    let fetcher = TileFetcher::new(vec![source], config).with_cache(workspace.cache());
    IngestPipeline::new(fetcher, sink, workspace.progress())
}

const RESUME: PipelineOptions = PipelineOptions {
    resume: true,
    clear_before_import: false,
};

/// Fails every tile west of 39°E, so district `a` only yields coverage gaps.
fn failing_west_of_39() -> StubFeatureSource {
    StubFeatureSource::new("stub", |bbox: &BoundingBox| {
        if bbox.min_lon() < 39.0 {
            Err(FetchError::from_status("stub", 500, "unavailable"))
        } else {
            Ok(military_square(40, bbox.min_lon() + 0.1, bbox.min_lat() + 0.1, 0.05))
        }
    })
}

fn no_split_config() -> FetcherConfig {
    FetcherConfig::default()
        .with_request_delay(Duration::ZERO)
        .with_policy(RetryPolicy::default().with_max_split_depth(0))
}

fn square_per_tile() -> StubFeatureSource {
    StubFeatureSource::new("stub", |bbox: &BoundingBox| {
        let id = (bbox.min_lon() * 10.0).round() as i64;
        Ok(military_square(id, bbox.min_lon() + 0.1, bbox.min_lat() + 0.1, 0.05))
    })
}

#[rstest]
fn successful_runs_clear_post_and_drop_the_checkpoint(workspace: Workspace) {
    let sink = RecordingSink::default();
    let log = sink.log();
    let pipeline = pipeline(square_per_tile(), sink, &workspace);

    let report = block_on_for_tests(
        pipeline.run(&[district("a", 37.0), district("b", 40.0)], &CancellationToken::new()),
    )
    .expect("run succeeds");

    assert!(report.is_success());
    assert_eq!(report.zones_posted(), 4);
    assert_eq!(log.borrow().clears, 1);
    assert_eq!(log.borrow().imports.len(), 2);
    assert!(!workspace.progress().path().exists());
}

#[rstest]
fn zones_repeated_across_tiles_are_posted_once(workspace: Workspace) {
    let sink = RecordingSink::default();
    let log = sink.log();
    let source = StubFeatureSource::answering("stub", military_square(1, 37.4, 55.2, 0.2));
    let pipeline = pipeline(source, sink, &workspace);

    let report = block_on_for_tests(pipeline.run(&[district("a", 37.0)], &CancellationToken::new()))
        .expect("run succeeds");

    assert_eq!(report.districts[0].tiles, 2);
    assert_eq!(report.zones_posted(), 1);
    let log = log.borrow();
    let properties = log.imports[0].features[0].properties.clone().expect("properties");
    assert_eq!(properties.name.as_deref(), Some("Полигон"));
    assert_eq!(properties.zone_type.as_deref(), Some("military"));
    assert_eq!(properties.severity.as_deref(), Some("critical"));
}

#[rstest]
fn failed_imports_do_not_stop_the_run(workspace: Workspace) {
    let sink = RecordingSink::failing_on([0]);
    let pipeline = pipeline(square_per_tile(), sink, &workspace);

    let report = block_on_for_tests(
        pipeline.run(&[district("a", 37.0), district("b", 40.0)], &CancellationToken::new()),
    )
    .expect("run finishes");

    assert!(!report.is_success());
    let failed: Vec<&str> = report.failed().map(|r| r.key.as_str()).collect();
    assert_eq!(failed, vec!["a"]);
    assert_eq!(report.districts[1].status, DistrictStatus::Completed);
    let progress = workspace.progress().load().expect("checkpoint kept");
    assert!(progress.is_district_complete("b"));
    assert!(!progress.is_district_complete("a"));
    assert_eq!(progress.tile_count("a"), 2);
}

#[rstest]
fn resumed_runs_skip_completed_districts_without_clearing(workspace: Workspace) {
    let mut progress = IngestionProgress::default();
    progress.mark_district("a");
    workspace.progress().save(&progress).expect("seed checkpoint");
    let sink = RecordingSink::default();
    let log = sink.log();
    let source = square_per_tile();
    let calls = source.call_log();
    let pipeline = pipeline(source, sink, &workspace).with_options(PipelineOptions {
        resume: true,
        clear_before_import: true,
    });

    let report = block_on_for_tests(
        pipeline.run(&[district("a", 37.0), district("b", 40.0)], &CancellationToken::new()),
    )
    .expect("run succeeds");

    assert_eq!(report.districts[0].status, DistrictStatus::AlreadyComplete);
    assert_eq!(report.districts[1].status, DistrictStatus::Completed);
    assert_eq!(log.borrow().clears, 0);
    assert_eq!(log.borrow().imports.len(), 1);
    assert_eq!(calls.borrow().len(), 2);
}

#[rstest]
fn resuming_from_a_corrupt_checkpoint_is_fatal(workspace: Workspace) {
    zoneguard_fs::write_atomic(workspace.progress().path(), b"not json").expect("seed");
    let pipeline = pipeline(square_per_tile(), RecordingSink::default(), &workspace)
        .with_options(PipelineOptions {
            resume: true,
            clear_before_import: false,
        });

    let err = block_on_for_tests(pipeline.run(&[district("a", 37.0)], &CancellationToken::new()))
        .expect_err("corrupt checkpoint");
    assert!(matches!(err, IngestError::Progress(_)));
}

#[rstest]
fn cancellation_saves_progress(workspace: Workspace) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = pipeline(square_per_tile(), RecordingSink::default(), &workspace)
        .with_options(PipelineOptions {
            resume: false,
            clear_before_import: false,
        });

    let err = block_on_for_tests(pipeline.run(&[district("a", 37.0)], &cancel))
        .expect_err("cancelled");
    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(
        workspace.progress().load().expect("checkpoint written"),
        IngestionProgress::default()
    );
}

#[rstest]
fn districts_with_coverage_gaps_stay_open_for_resume(workspace: Workspace) {
    let first = pipeline_with(
        no_split_config(),
        failing_west_of_39(),
        RecordingSink::failing_on([1]),
        &workspace,
    );
    let report = block_on_for_tests(
        first.run(&[district("a", 37.0), district("b", 40.0)], &CancellationToken::new()),
    )
    .expect("run finishes");

    assert_eq!(report.districts[0].status, DistrictStatus::Completed);
    assert_eq!(report.districts[0].skipped_tiles(), 2);
    assert_eq!(report.coverage_gaps(), 2);
    let progress = workspace.progress().load().expect("checkpoint kept");
    assert!(!progress.is_district_complete("a"));
    assert!(!progress.is_district_complete("b"));

    let sink = RecordingSink::default();
    let log = sink.log();
    let source = square_per_tile();
    let calls = source.call_log();
    let resumed = pipeline(source, sink, &workspace).with_options(RESUME);
    let report = block_on_for_tests(
        resumed.run(&[district("a", 37.0), district("b", 40.0)], &CancellationToken::new()),
    )
    .expect("resumed run succeeds");

    assert!(report.is_success());
    assert_eq!(report.coverage_gaps(), 0);
    assert_eq!(report.districts[0].status, DistrictStatus::Completed);
    assert_eq!(report.districts[0].schedule.fetched, 2);
    assert_eq!(report.districts[1].schedule.cached, 2);
    assert_eq!(log.borrow().imports.len(), 2);
    assert_eq!(calls.borrow().len(), 2);
    assert!(!workspace.progress().path().exists());
}

#[rstest]
fn successful_runs_with_gaps_keep_the_checkpoint(workspace: Workspace) {
    let pipeline = pipeline_with(
        no_split_config(),
        failing_west_of_39(),
        RecordingSink::default(),
        &workspace,
    );

    let report = block_on_for_tests(pipeline.run(&[district("a", 37.0)], &CancellationToken::new()))
        .expect("run finishes");

    assert!(report.is_success());
    assert_eq!(report.coverage_gaps(), 2);
    assert!(workspace.progress().path().exists());
    let progress = workspace.progress().load().expect("checkpoint kept");
    assert!(!progress.is_district_complete("a"));
    assert_eq!(progress.tile_count("a"), 0);
}

#[rstest]
fn cancelling_mid_district_checkpoints_resolved_tiles(workspace: Workspace) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let calls = Cell::new(0_usize);
    let source = StubFeatureSource::new("stub", move |bbox: &BoundingBox| {
        calls.set(calls.get() + 1);
        if calls.get() == 2 {
            trigger.cancel();
            return Err(FetchError::Cancelled);
        }
        Ok(military_square(1, bbox.min_lon() + 0.1, bbox.min_lat() + 0.1, 0.05))
    });
    let first_tile = BoundingBox::new(37.0, 55.0, 37.5, 55.5).expect("bbox");
    let second_tile = BoundingBox::new(37.5, 55.0, 38.0, 55.5).expect("bbox");
    let interrupted = pipeline(source, RecordingSink::default(), &workspace).with_options(
        PipelineOptions {
            resume: false,
            clear_before_import: false,
        },
    );

    let err = block_on_for_tests(interrupted.run(&[district("a", 37.0)], &cancel))
        .expect_err("cancelled");
    assert!(matches!(err, IngestError::Cancelled));
    let progress = workspace.progress().load().expect("checkpoint written");
    assert!(progress.is_tile_complete("a", &first_tile.tile_key()));
    assert_eq!(progress.tile_count("a"), 1);
    assert!(!progress.is_district_complete("a"));

    let sink = RecordingSink::default();
    let log = sink.log();
    let source = square_per_tile();
    let fetched = source.call_log();
    let resumed = pipeline(source, sink, &workspace).with_options(RESUME);
    let report = block_on_for_tests(resumed.run(&[district("a", 37.0)], &CancellationToken::new()))
        .expect("resumed run succeeds");

    assert_eq!(report.districts[0].schedule.cached, 1);
    assert_eq!(report.districts[0].schedule.fetched, 1);
    assert_eq!(*fetched.borrow(), vec![second_tile.tile_key()]);
    assert_eq!(log.borrow().imports[0].features.len(), 2);
}

#[rstest]
fn every_ring_becomes_a_feature() {
    let polygon = AssembledPolygon {
        key: ElementKey {
            kind: ElementKind::Relation,
            id: 5,
        },
        tags: tags(&[("aeroway", "aerodrome")]),
        rings: vec![
            close_ring(vec![
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 1.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 1.0 },
            ])
            .expect("ring"),
            close_ring(vec![
                geo::Coord { x: 5.0, y: 5.0 },
                geo::Coord { x: 6.0, y: 5.0 },
                geo::Coord { x: 5.0, y: 6.0 },
            ])
            .expect("ring"),
        ],
    };
    let features = zone_features(&polygon);
    assert_eq!(features.len(), 2);
    let properties = features[1].properties.clone().expect("properties");
    assert_eq!(properties.name.as_deref(), Some("aerodrome relation/5"));
    assert_eq!(properties.severity.as_deref(), Some("restricted"));
}
