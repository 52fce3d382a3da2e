//! Tile job scheduler.
//!
//! Each top-level tile becomes a job. A job that exhausts every endpoint is
//! split into four quadrant jobs one level deeper; beyond the maximum depth it
//! is skipped and reported as a coverage gap. Jobs are drained from an explicit
//! queue through a bounded [`FuturesUnordered`] on the calling task, so
//! sources need not be `Send`.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use zoneguard_core::BoundingBox;

use super::{CacheError, DEFAULT_REQUEST_DELAY, EndpointLimiter, RetryPolicy, TileCache};
use crate::element::RawElement;
use crate::overpass::{
    DEFAULT_SERVER_TIMEOUT_SECS, FeatureSource, FetchError, TileRequest, build_query,
};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Backoff and split limits.
    pub policy: RetryPolicy,
    /// Minimum spacing between requests to one endpoint.
    pub request_delay: Duration,
    /// Maximum number of jobs in flight.
    pub concurrency: usize,
    /// Server-side `[timeout:N]` written into each query.
    pub query_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            request_delay: DEFAULT_REQUEST_DELAY,
            concurrency: 1,
            query_timeout_secs: DEFAULT_SERVER_TIMEOUT_SECS,
        }
    }
}

impl FetcherConfig {
    /// Set the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-endpoint request spacing.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Set the number of jobs in flight; zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the server-side query timeout.
    #[must_use]
    pub const fn with_query_timeout_secs(mut self, secs: u64) -> Self {
        self.query_timeout_secs = secs;
        self
    }
}

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Fetched from an endpoint.
    Fetched,
    /// Served from the tile cache.
    Cached,
    /// Assembled from its four quadrants.
    Split,
    /// Given up on beyond the maximum split depth.
    Skipped,
}

/// A top-level tile whose job tree has fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTile {
    /// Position of the tile in the list handed to [`TileFetcher::run`].
    pub index: usize,
    /// Tile bounds.
    pub bbox: BoundingBox,
    /// Elements gathered for the tile, possibly with repeats across quadrants.
    pub elements: Vec<RawElement>,
    /// How the tile resolved.
    pub outcome: TileOutcome,
    /// Number of skipped jobs beneath the tile.
    pub skipped: usize,
}

/// Job counts for one [`TileFetcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Jobs answered by an endpoint.
    pub fetched: usize,
    /// Jobs answered from the cache.
    pub cached: usize,
    /// Jobs split into quadrants.
    pub split: usize,
    /// Jobs skipped as coverage gaps.
    pub skipped: usize,
}

impl ScheduleSummary {
    fn record(&mut self, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Fetched => self.fetched += 1,
            TileOutcome::Cached => self.cached += 1,
            TileOutcome::Split => self.split += 1,
            TileOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Add the counts of `other`.
    pub fn absorb(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.cached += other.cached;
        self.split += other.split;
        self.skipped += other.skipped;
    }
}

#[derive(Debug)]
struct Endpoint<S> {
    source: S,
    limiter: EndpointLimiter,
}

/// Fetches tiles from a rotation of endpoints with retry, split and cache.
#[derive(Debug)]
pub struct TileFetcher<S> {
    endpoints: Vec<Endpoint<S>>,
    config: FetcherConfig,
    cache: Option<TileCache>,
}

impl<S: FeatureSource> TileFetcher<S> {
    /// Fetcher rotating through `sources` in order, one limiter per source.
    #[must_use]
    pub fn new(sources: Vec<S>, config: FetcherConfig) -> Self {
        let endpoints = sources
            .into_iter()
            .map(|source| Endpoint {
                source,
                limiter: EndpointLimiter::new(config.request_delay),
            })
            .collect();
        Self {
            endpoints,
            config,
            cache: None,
        }
    }

    /// Cache resolved tiles in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: TileCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Tile cache, when configured.
    #[must_use]
    pub const fn cache(&self) -> Option<&TileCache> {
        self.cache.as_ref()
    }

    /// Scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch one tile, rotating endpoints until one answers.
    ///
    /// Each endpoint gets `attempts_per_endpoint` tries. Failures back off per
    /// the retry policy, except after the final try.
    ///
    /// # Errors
    ///
    /// Returns the last failure once every try is exhausted,
    /// [`FetchError::NoEndpoints`] without endpoints and
    /// [`FetchError::Cancelled`] when `cancel` fires.
    pub async fn fetch_tile(
        &self,
        bbox: &BoundingBox,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawElement>, FetchError> {
        let request = TileRequest {
            bbox: *bbox,
            query: build_query(bbox, self.config.query_timeout_secs),
        };
        let attempts = self.config.policy.attempts_per_endpoint.max(1);
        let total = self.endpoints.len() * attempts as usize;
        let mut tried = 0;
        let mut last_error = None;
        for endpoint in &self.endpoints {
            for attempt in 1..=attempts {
                endpoint.limiter.acquire(cancel).await?;
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(FetchError::Cancelled),
                    result = endpoint.source.fetch(&request) => result,
                };
                let error = match result {
                    Ok(elements) => return Ok(elements),
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(error) => error,
                };
                tried += 1;
                if tried < total {
                    let delay = self.config.policy.delay_for(error.class(), attempt);
                    warn!(
                        "tile {} attempt {attempt} on {} failed: {error}; retrying in {delay:?}",
                        bbox.tile_key(),
                        endpoint.source.endpoint(),
                    );
                    sleep_or_cancel(delay, cancel).await?;
                }
                last_error = Some(error);
            }
        }
        Err(last_error.unwrap_or(FetchError::NoEndpoints))
    }

    /// Resolve every tile in `tiles`, reporting each top-level tile once its
    /// job tree completes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NoEndpoints`] when no endpoints are configured and
    /// [`FetchError::Cancelled`] when `cancel` fires. Tiles reported before
    /// cancellation stay reported.
    pub async fn run(
        &self,
        tiles: &[BoundingBox],
        cancel: &CancellationToken,
        on_resolved: &mut dyn FnMut(ResolvedTile),
    ) -> Result<ScheduleSummary, FetchError> {
        if self.endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }
        let mut tree = JobTree::default();
        let mut summary = ScheduleSummary::default();
        for (index, bbox) in tiles.iter().enumerate() {
            let id = tree.push(*bbox, 0, None, index);
            self.enqueue(&mut tree, id, &mut summary, on_resolved);
        }

        let concurrency = self.config.concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < concurrency {
                let Some(id) = tree.queue.pop_front() else {
                    break;
                };
                let bbox = tree.bbox(id);
                in_flight.push(async move { (id, self.fetch_tile(&bbox, cancel).await) });
            }
            if in_flight.is_empty() {
                break;
            }
            let (id, result) = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                Some(done) = in_flight.next() => done,
            };
            match result {
                Ok(elements) => {
                    self.store_in_cache(&tree.bbox(id), &elements);
                    summary.record(TileOutcome::Fetched);
                    if let Some(resolved) = tree.complete(id, elements, TileOutcome::Fetched, 0, self)
                    {
                        on_resolved(resolved);
                    }
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(FetchError::NoEndpoints) => return Err(FetchError::NoEndpoints),
                Err(error) => self.exhausted(&mut tree, id, &error, &mut summary, on_resolved),
            }
        }
        info!(
            "resolved {} tiles: {} fetched, {} cached, {} split, {} skipped",
            tiles.len(),
            summary.fetched,
            summary.cached,
            summary.split,
            summary.skipped,
        );
        Ok(summary)
    }

    fn enqueue(
        &self,
        tree: &mut JobTree,
        id: usize,
        summary: &mut ScheduleSummary,
        on_resolved: &mut dyn FnMut(ResolvedTile),
    ) {
        let bbox = tree.bbox(id);
        match self.load_from_cache(&bbox) {
            Some(elements) => {
                debug!("tile {} served from cache", bbox.tile_key());
                summary.record(TileOutcome::Cached);
                if let Some(resolved) = tree.complete(id, elements, TileOutcome::Cached, 0, self) {
                    on_resolved(resolved);
                }
            }
            None => tree.queue.push_back(id),
        }
    }

    fn exhausted(
        &self,
        tree: &mut JobTree,
        id: usize,
        error: &FetchError,
        summary: &mut ScheduleSummary,
        on_resolved: &mut dyn FnMut(ResolvedTile),
    ) {
        let bbox = tree.bbox(id);
        let depth = tree.depth(id);
        if depth < self.config.policy.max_split_depth {
            warn!(
                "tile {} exhausted all endpoints ({error}); splitting at depth {}",
                bbox.tile_key(),
                depth + 1,
            );
            summary.record(TileOutcome::Split);
            let top = tree.top(id);
            let children: Vec<usize> = bbox
                .split_quadrants()
                .into_iter()
                .map(|quadrant| tree.push(quadrant, depth + 1, Some(id), top))
                .collect();
            tree.set_pending(id, children.len());
            for child in children {
                self.enqueue(tree, child, summary, on_resolved);
            }
        } else {
            warn!(
                "coverage gap: tile {} at depth {depth} skipped ({error})",
                bbox.tile_key()
            );
            summary.record(TileOutcome::Skipped);
            if let Some(resolved) = tree.complete(id, Vec::new(), TileOutcome::Skipped, 1, self) {
                on_resolved(resolved);
            }
        }
    }

    fn load_from_cache(&self, bbox: &BoundingBox) -> Option<Vec<RawElement>> {
        let cache = self.cache.as_ref()?;
        cache.load(bbox).unwrap_or_else(|err| {
            warn!("ignoring unreadable cache entry for {}: {err}", bbox.tile_key());
            None
        })
    }

    fn store_in_cache(&self, bbox: &BoundingBox, elements: &[RawElement]) {
        if let Some(cache) = &self.cache
            && let Err(err) = cache.store(bbox, elements)
        {
            log_cache_write_failure(bbox, &err);
        }
    }
}

fn log_cache_write_failure(bbox: &BoundingBox, err: &CacheError) {
    warn!("failed to cache tile {}: {err}", bbox.tile_key());
}

/// Sleep for `delay`, failing early if `cancel` fires.
///
/// # Errors
///
/// Returns [`FetchError::Cancelled`] when `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FetchError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[derive(Debug)]
struct Job {
    bbox: BoundingBox,
    depth: u8,
    parent: Option<usize>,
    top: usize,
    pending: usize,
    elements: Vec<RawElement>,
    skipped: usize,
}

/// Arena of jobs; children point at their parent by index.
#[derive(Debug, Default)]
struct JobTree {
    jobs: Vec<Job>,
    queue: VecDeque<usize>,
}

impl JobTree {
    fn push(&mut self, bbox: BoundingBox, depth: u8, parent: Option<usize>, top: usize) -> usize {
        self.jobs.push(Job {
            bbox,
            depth,
            parent,
            top,
            pending: 0,
            elements: Vec::new(),
            skipped: 0,
        });
        self.jobs.len() - 1
    }

    // Ids only ever come from `push`, so indexing stays in bounds.
    fn bbox(&self, id: usize) -> BoundingBox {
        self.jobs[id].bbox
    }

    fn depth(&self, id: usize) -> u8 {
        self.jobs[id].depth
    }

    fn top(&self, id: usize) -> usize {
        self.jobs[id].top
    }

    fn set_pending(&mut self, id: usize, pending: usize) {
        self.jobs[id].pending = pending;
    }

    /// Fold a finished job into its ancestors.
    ///
    /// Returns the top-level tile when this completion resolves it. A split
    /// parent is cached once its last child lands, unless a descendant was
    /// skipped.
    fn complete<S: FeatureSource>(
        &mut self,
        id: usize,
        elements: Vec<RawElement>,
        outcome: TileOutcome,
        skipped: usize,
        fetcher: &TileFetcher<S>,
    ) -> Option<ResolvedTile> {
        let mut current = id;
        let mut elements = elements;
        let mut outcome = outcome;
        let mut skipped = skipped;
        loop {
            let job = self.jobs.get(current)?;
            let Some(parent_id) = job.parent else {
                return Some(ResolvedTile {
                    index: job.top,
                    bbox: job.bbox,
                    elements,
                    outcome,
                    skipped,
                });
            };
            let parent = self.jobs.get_mut(parent_id)?;
            parent.elements.append(&mut elements);
            parent.skipped += skipped;
            parent.pending = parent.pending.saturating_sub(1);
            if parent.pending > 0 {
                return None;
            }
            elements = std::mem::take(&mut parent.elements);
            skipped = parent.skipped;
            outcome = TileOutcome::Split;
            if skipped == 0 {
                fetcher.store_in_cache(&parent.bbox, &elements);
            }
            current = parent_id;
        }
    }
}

#[cfg(test)]
mod tests;
