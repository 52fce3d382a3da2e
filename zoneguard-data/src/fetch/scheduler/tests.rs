//! Scheduler tests on a paused clock.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use zoneguard_core::BoundingBox;

use super::*;
use crate::test_support::{StubFeatureSource, military_square};

fn quick_config() -> FetcherConfig {
    FetcherConfig::default()
        .with_request_delay(Duration::ZERO)
        .with_policy(RetryPolicy::default().with_base_delay(Duration::from_secs(2)))
}

fn tile() -> BoundingBox {
    BoundingBox::new(37.0, 55.0, 37.5, 55.5).expect("bbox")
}

#[fixture]
fn cache_dir() -> (TempDir, TileCache) {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    (dir, TileCache::new(root.join("tiles")))
}

async fn run_collecting<S: FeatureSource>(
    fetcher: &TileFetcher<S>,
    tiles: &[BoundingBox],
) -> (ScheduleSummary, Vec<ResolvedTile>) {
    let mut resolved = Vec::new();
    let summary = fetcher
        .run(tiles, &CancellationToken::new(), &mut |tile| resolved.push(tile))
        .await
        .expect("run succeeds");
    (summary, resolved)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rotates_to_the_next_endpoint_after_transient_failures() {
    let failing = StubFeatureSource::failing("primary", 500);
    let answering = StubFeatureSource::answering("secondary", military_square(1, 37.1, 55.1, 0.01));
    let (failing_log, answering_log) = (failing.call_log(), answering.call_log());
    let fetcher = TileFetcher::new(vec![failing, answering], quick_config());

    let start = Instant::now();
    let elements = fetcher
        .fetch_tile(&tile(), &CancellationToken::new())
        .await
        .expect("secondary answers");

    assert_eq!(elements.len(), 5);
    assert_eq!(failing_log.borrow().len(), 2);
    assert_eq!(answering_log.borrow().len(), 1);
    assert_eq!(start.elapsed(), Duration::from_secs(2 + 4));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_by_powers_of_three() {
    let limited = StubFeatureSource::failing("primary", 429);
    let answering = StubFeatureSource::answering("secondary", Vec::new());
    let fetcher = TileFetcher::new(vec![limited, answering], quick_config());

    let start = Instant::now();
    fetcher
        .fetch_tile(&tile(), &CancellationToken::new())
        .await
        .expect("secondary answers");
    assert_eq!(start.elapsed(), Duration::from_secs(6 + 18));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn does_not_wait_after_the_final_attempt() {
    let fetcher = TileFetcher::new(vec![StubFeatureSource::failing("only", 500)], quick_config());

    let start = Instant::now();
    let err = fetcher
        .fetch_tile(&tile(), &CancellationToken::new())
        .await
        .expect_err("every attempt fails");
    assert!(matches!(err, FetchError::Http { status: 500, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exhausted_tiles_split_and_the_parent_is_cached(
    #[from(cache_dir)] (_dir, cache): (TempDir, TileCache),
) {
    let source = StubFeatureSource::new("narrow", |bbox: &BoundingBox| {
        if bbox.width() > 0.3 {
            Err(FetchError::from_status("narrow", 504, "too large"))
        } else {
            Ok(military_square(1, bbox.min_lon(), bbox.min_lat(), 0.01))
        }
    });
    let fetcher = TileFetcher::new(vec![source], quick_config()).with_cache(cache.clone());

    let (summary, resolved) = run_collecting(&fetcher, &[tile()]).await;

    assert_eq!(summary.split, 1);
    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.skipped, 0);
    let [top] = resolved.as_slice() else {
        panic!("expected one resolved tile, got {resolved:?}");
    };
    assert_eq!(top.outcome, TileOutcome::Split);
    assert_eq!(top.elements.len(), 4 * 5);
    assert!(cache.load(&tile()).expect("cache readable").is_some());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failures_beyond_the_split_depth_are_skipped_and_not_cached(
    #[from(cache_dir)] (_dir, cache): (TempDir, TileCache),
) {
    let config = quick_config()
        .with_policy(RetryPolicy::default().with_max_split_depth(1).with_attempts_per_endpoint(1));
    let fetcher = TileFetcher::new(vec![StubFeatureSource::failing("down", 500)], config)
        .with_cache(cache.clone());

    let (summary, resolved) = run_collecting(&fetcher, &[tile()]).await;

    assert_eq!(summary.split, 1);
    assert_eq!(summary.skipped, 4);
    let [top] = resolved.as_slice() else {
        panic!("expected one resolved tile, got {resolved:?}");
    };
    assert_eq!(top.skipped, 4);
    assert!(top.elements.is_empty());
    assert!(cache.load(&tile()).expect("cache readable").is_none());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rerun_is_served_from_the_cache(#[from(cache_dir)] (_dir, cache): (TempDir, TileCache)) {
    let tiles = [tile(), BoundingBox::new(37.5, 55.0, 38.0, 55.5).expect("bbox")];
    let first = TileFetcher::new(
        vec![StubFeatureSource::answering("live", military_square(1, 37.1, 55.1, 0.01))],
        quick_config(),
    )
    .with_cache(cache.clone());
    let (summary, _) = run_collecting(&first, &tiles).await;
    assert_eq!(summary.fetched, 2);

    let offline = StubFeatureSource::failing("offline", 500);
    let offline_log = offline.call_log();
    let second = TileFetcher::new(vec![offline], quick_config()).with_cache(cache);
    let (summary, resolved) = run_collecting(&second, &tiles).await;

    assert_eq!(summary.cached, 2);
    assert!(offline_log.borrow().is_empty());
    let indices: Vec<usize> = resolved.iter().map(|tile| tile.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(resolved.iter().all(|tile| tile.outcome == TileOutcome::Cached));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn concurrent_jobs_share_one_limiter_per_endpoint() {
    let config = quick_config()
        .with_concurrency(4)
        .with_request_delay(Duration::from_secs(1));
    let fetcher = TileFetcher::new(vec![StubFeatureSource::answering("live", Vec::new())], config);
    let tiles: Vec<BoundingBox> = tile().split_quadrants().into_iter().collect();

    let start = Instant::now();
    let (summary, resolved) = run_collecting(&fetcher, &tiles).await;
    assert_eq!(summary.fetched, 4);
    assert_eq!(resolved.len(), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[rstest]
#[tokio::test]
async fn running_without_endpoints_fails() {
    let fetcher: TileFetcher<StubFeatureSource> = TileFetcher::new(Vec::new(), quick_config());
    let err = fetcher
        .run(&[tile()], &CancellationToken::new(), &mut |_| {})
        .await
        .expect_err("no endpoints");
    assert!(matches!(err, FetchError::NoEndpoints));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_run() {
    let fetcher = TileFetcher::new(vec![StubFeatureSource::failing("down", 503)], quick_config());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut resolved = 0;
    let err = fetcher
        .run(&[tile()], &cancel, &mut |_| resolved += 1)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(resolved, 0);
}
