//! Retry and split policy for tile fetches.
//!
//! Rate-limited responses back off by powers of three, every other failure
//! by powers of two, and no wait exceeds the configured cap.

use std::time::Duration;

use crate::overpass::FailureClass;

/// Default first backoff step.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
/// Default ceiling on any single backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);
/// Default attempts made against each endpoint before rotating.
pub const DEFAULT_ATTEMPTS_PER_ENDPOINT: u32 = 2;
/// Default number of times a failing tile may be quartered.
pub const DEFAULT_MAX_SPLIT_DEPTH: u8 = 3;

/// Retry, backoff and split limits for tile jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First backoff step.
    pub base_delay: Duration,
    /// Ceiling on any single backoff.
    pub max_backoff: Duration,
    /// Attempts made against each endpoint before moving to the next.
    pub attempts_per_endpoint: u32,
    /// Maximum quadrant split depth; deeper failures are skipped.
    pub max_split_depth: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_backoff: DEFAULT_MAX_BACKOFF,
            attempts_per_endpoint: DEFAULT_ATTEMPTS_PER_ENDPOINT,
            max_split_depth: DEFAULT_MAX_SPLIT_DEPTH,
        }
    }
}

impl RetryPolicy {
    /// Set the first backoff step.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the backoff ceiling.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Set the attempts made per endpoint; at least one is always made.
    #[must_use]
    pub const fn with_attempts_per_endpoint(mut self, attempts: u32) -> Self {
        self.attempts_per_endpoint = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set the maximum split depth.
    #[must_use]
    pub const fn with_max_split_depth(mut self, depth: u8) -> Self {
        self.max_split_depth = depth;
        self
    }

    /// Wait before retrying after the `attempt`-th failure on an endpoint.
    ///
    /// `attempt` counts from 1. Rate limits back off as `base × 3^attempt`,
    /// other failures as `base × 2^(attempt − 1)`; both are capped.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use zoneguard_data::fetch::RetryPolicy;
    /// use zoneguard_data::overpass::FailureClass;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(FailureClass::RateLimit, 1), Duration::from_secs(6));
    /// assert_eq!(policy.delay_for(FailureClass::Transient, 1), Duration::from_secs(2));
    /// assert_eq!(policy.delay_for(FailureClass::RateLimit, 9), Duration::from_secs(120));
    /// ```
    #[must_use]
    pub fn delay_for(&self, class: FailureClass, attempt: u32) -> Duration {
        let factor = match class {
            FailureClass::RateLimit => 3_u32.saturating_pow(attempt),
            FailureClass::Transient => 2_u32.saturating_pow(attempt.saturating_sub(1)),
        };
        self.base_delay.saturating_mul(factor).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FailureClass::RateLimit, 1, 6)]
    #[case(FailureClass::RateLimit, 2, 18)]
    #[case(FailureClass::RateLimit, 3, 54)]
    #[case(FailureClass::RateLimit, 4, 120)]
    #[case(FailureClass::Transient, 1, 2)]
    #[case(FailureClass::Transient, 2, 4)]
    #[case(FailureClass::Transient, 3, 8)]
    #[case(FailureClass::Transient, 7, 120)]
    fn backoff_schedule(#[case] class: FailureClass, #[case] attempt: u32, #[case] secs: u64) {
        assert_eq!(
            RetryPolicy::default().delay_for(class, attempt),
            Duration::from_secs(secs)
        );
    }

    #[rstest]
    fn huge_attempts_saturate_at_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(FailureClass::RateLimit, u32::MAX),
            DEFAULT_MAX_BACKOFF
        );
    }

    #[rstest]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(
            RetryPolicy::default()
                .with_attempts_per_endpoint(0)
                .attempts_per_endpoint,
            1
        );
    }
}
