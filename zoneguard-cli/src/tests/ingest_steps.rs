//! Behaviour-driven step definitions driving the ingest CLI scenarios.

use super::helpers::{Workspace, parse_ingest, write_utf8};
use super::*;
use crate::ingest::{clean_workspace, execute_ingest, open_store, summarize};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zoneguard_core::ZoneService;
use zoneguard_data::StoreSink;
use zoneguard_data::test_support::{
    RecordingSink, StubFeatureSource, block_on_for_tests, military_square,
};

#[derive(Debug)]
struct IngestWorld {
    workspace: Workspace,
    cli_args: RefCell<Vec<String>>,
    answers_with_zone: Cell<bool>,
    recording_sink: RefCell<Option<RecordingSink>>,
    cancelled: Cell<bool>,
    store: RefCell<Option<Arc<ZoneService>>>,
    result: RefCell<Option<Result<(), CliError>>>,
}

impl IngestWorld {
    fn new() -> Self {
        let workspace = Workspace::new();
        let mut cli_args = workspace.ingest_flags();
        cli_args.extend(["--tile-size", "5", "--request-delay-ms", "0"].map(str::to_owned));
        Self {
            workspace,
            cli_args: RefCell::new(cli_args),
            answers_with_zone: Cell::new(false),
            recording_sink: RefCell::new(None),
            cancelled: Cell::new(false),
            store: RefCell::new(None),
            result: RefCell::new(None),
        }
    }

    fn source(&self) -> StubFeatureSource {
        if self.answers_with_zone.get() {
            StubFeatureSource::answering("stub", military_square(7, 37.0, 55.5, 0.1))
        } else {
            StubFeatureSource::answering("stub", Vec::new())
        }
    }

    /// Mirror `run_ingest` with stub transports.
    fn invoke(&self, extra: &[&str]) -> Result<(), CliError> {
        let mut args = self.cli_args.borrow().clone();
        args.extend(extra.iter().map(|&flag| flag.to_owned()));
        let (command, config) = parse_ingest(&args)?;
        if command.clean {
            return clean_workspace(&config);
        }

        let cancel = CancellationToken::new();
        if self.cancelled.get() {
            cancel.cancel();
        }
        let options = command.options();
        let sources = vec![self.source()];
        let report = match self.recording_sink.borrow().clone() {
            Some(sink) => {
                block_on_for_tests(execute_ingest(&config, options, sources, sink, &cancel))
            }
            None => {
                let service = Arc::new(open_store(&config)?);
                let sink = StoreSink::new(Arc::clone(&service));
                let outcome =
                    block_on_for_tests(execute_ingest(&config, options, sources, sink, &cancel));
                service.flush();
                self.store.replace(Some(service));
                outcome
            }
        }?;
        summarize(&report)
    }

    fn record(&self, extra: &[&str]) {
        let outcome = self.invoke(extra);
        self.result.replace(Some(outcome));
    }

    fn error_message(&self) -> String {
        let borrowed = self.result.borrow();
        borrowed
            .as_ref()
            .expect("result recorded")
            .as_ref()
            .expect_err("expected failure")
            .to_string()
    }
}

#[fixture]
fn world() -> IngestWorld {
    IngestWorld::new()
}

#[given("an ingest invocation for the {selection} district")]
fn invocation_for(#[from(world)] world: &IngestWorld, selection: String) {
    let selection = selection.trim_matches('"').to_owned();
    world
        .cli_args
        .borrow_mut()
        .extend(["--district".to_owned(), selection]);
}

#[given("an endpoint returning one military zone")]
fn endpoint_with_zone(#[from(world)] world: &IngestWorld) {
    world.answers_with_zone.set(true);
}

#[given("an import endpoint that refuses the first import")]
fn refusing_sink(#[from(world)] world: &IngestWorld) {
    world
        .recording_sink
        .replace(Some(RecordingSink::failing_on([0])));
}

#[given("the run is cancelled before it starts")]
fn cancelled_run(#[from(world)] world: &IngestWorld) {
    world.cancelled.set(true);
}

#[given("a tile cache and progress checkpoint on disk")]
fn cache_on_disk(#[from(world)] world: &IngestWorld) {
    write_utf8(&world.workspace.path("tiles/tile_0_0_1_1.json"), b"[]");
    write_utf8(&world.workspace.path("progress.json"), b"{}");
}

#[when("I run the ingest command")]
fn run_ingest_command(#[from(world)] world: &IngestWorld) {
    world.record(&[]);
}

#[when("I resume the ingest run")]
fn rerun_with_resume(#[from(world)] world: &IngestWorld) {
    world.record(&["--resume"]);
}

#[when("I clean the ingest workspace")]
fn run_with_clean(#[from(world)] world: &IngestWorld) {
    world.record(&["--clean"]);
}

#[then("the command succeeds")]
fn command_succeeds(#[from(world)] world: &IngestWorld) {
    let borrowed = world.result.borrow();
    let result = borrowed.as_ref().expect("result recorded");
    if let Err(err) = result {
        panic!("expected success, found {err}");
    }
}

#[then("the local zone store holds {count} zone")]
fn store_holds(#[from(world)] world: &IngestWorld, count: usize) {
    let borrowed = world.store.borrow();
    let service = borrowed.as_ref().expect("local store opened");
    assert_eq!(service.stats().total, count);
}

#[then("the zone file is written")]
fn zone_file_written(#[from(world)] world: &IngestWorld) {
    assert!(world.workspace.path("zones.geojson").is_file());
}

#[then("the command fails naming the {district} district")]
fn fails_naming(#[from(world)] world: &IngestWorld, district: String) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected failure");
    match error {
        CliError::DistrictsFailed { districts, .. } => {
            assert_eq!(districts, district.trim_matches('"'));
        }
        other => panic!("expected DistrictsFailed, found {other:?}"),
    }
}

#[then("the command fails as cancelled")]
fn fails_cancelled(#[from(world)] world: &IngestWorld) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected failure");
    assert!(matches!(error, CliError::Cancelled), "found {error:?}");
}

#[then("the failure message suggests resuming")]
fn suggests_resume(#[from(world)] world: &IngestWorld) {
    assert!(world.error_message().contains("--resume"));
}

#[then("the import endpoint was cleared {count} time")]
fn cleared_times(#[from(world)] world: &IngestWorld, count: usize) {
    let sink = world.recording_sink.borrow();
    let log = sink.as_ref().expect("recording sink").log();
    assert_eq!(log.borrow().clears, count);
}

#[then("the import endpoint received {count} imports")]
fn received_imports(#[from(world)] world: &IngestWorld, count: usize) {
    let sink = world.recording_sink.borrow();
    let log = sink.as_ref().expect("recording sink").log();
    assert_eq!(log.borrow().imports.len(), count);
}

#[then("the tile cache and progress checkpoint are gone")]
fn cache_gone(#[from(world)] world: &IngestWorld) {
    assert!(!world.workspace.path("tiles").exists());
    assert!(!world.workspace.path("progress.json").exists());
}

macro_rules! register_ingest_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/ingest_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: IngestWorld) {
            let _ = world;
        }
    };
}

register_ingest_scenario!(
    importing_into_local_store,
    "importing a district into the local zone store"
);
register_ingest_scenario!(
    reporting_refused_import,
    "reporting a district whose import was refused"
);
register_ingest_scenario!(resuming_after_refusal, "resuming after a refused import");
register_ingest_scenario!(cancelling_early, "cancelling before any tile is fetched");
register_ingest_scenario!(
    cleaning_workspace,
    "cleaning the tile cache and progress checkpoint"
);
