//! Per-endpoint request spacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::overpass::FetchError;

/// Default minimum spacing between requests to one endpoint.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Enforces a minimum delay between consecutive requests to one endpoint.
///
/// Every job that targets the endpoint shares the same limiter, so the spacing
/// holds however many jobs run concurrently.
#[derive(Debug)]
pub struct EndpointLimiter {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl EndpointLimiter {
    /// Limiter spacing requests by `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    /// Configured spacing.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for the next request slot, or fail if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        let mut next_slot = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            guard = self.next_slot.lock() => guard,
        };
        if let Some(at) = *next_slot {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                () = sleep_until(at) => {}
            }
        }
        *next_slot = Some(Instant::now() + self.delay);
        Ok(())
    }
}

impl Default for EndpointLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn spaces_consecutive_requests() {
        let limiter = EndpointLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(&cancel).await.expect("slot");
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn idle_time_counts_towards_the_delay() {
        let limiter = EndpointLimiter::new(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.expect("first");
        tokio::time::sleep(Duration::from_secs(5)).await;
        let before = Instant::now();
        limiter.acquire(&cancel).await.expect("second");
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let limiter = EndpointLimiter::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.expect("first");
        cancel.cancel();
        let err = limiter.acquire(&cancel).await.expect_err("cancelled");
        assert!(matches!(err, FetchError::Cancelled));
    }
}
