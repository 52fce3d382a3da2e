//! Tile fetching: retry policy, endpoint rate limits, the job scheduler, the
//! tile cache and the resumable progress checkpoint.

mod cache;
mod limiter;
mod progress;
mod retry;
mod scheduler;

pub use cache::{CacheError, TileCache};
pub use limiter::{DEFAULT_REQUEST_DELAY, EndpointLimiter};
pub use progress::{IngestionProgress, ProgressError, ProgressStore};
pub use retry::{
    DEFAULT_ATTEMPTS_PER_ENDPOINT, DEFAULT_BASE_DELAY, DEFAULT_MAX_BACKOFF,
    DEFAULT_MAX_SPLIT_DEPTH, RetryPolicy,
};
pub use scheduler::{
    FetcherConfig, ResolvedTile, ScheduleSummary, TileFetcher, TileOutcome, sleep_or_cancel,
};
