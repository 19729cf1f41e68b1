//! Retry policy with exponential backoff for market data API calls.
//!
//! # Retry classes
//!
//! | Class | Statuses | Behavior |
//! |-------|----------|----------|
//! | Rate limited | 429 | `Retry-After`, else rate-limit ladder |
//! | Banned | 418 | fixed cooldown, then retry |
//! | Retryable | network errors, 5xx, other 4xx | `base * 2^attempt` |
//! | Non-retryable | 401, 403 | fail immediately |
//!
//! Rate-limit and ban retries draw from their own budget so a throttled run
//! still terminates.
//!
//! # Example
//!
//! ```rust,ignore
//! use oi_monitor::fetcher::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let mut budget = policy.budget();
//!
//! let delay1 = budget.next_transient(); // Some(1s)
//! let delay2 = budget.next_transient(); // Some(2s)
//! let delay3 = budget.next_transient(); // None: three attempts used
//! ```

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Retry policy for one upstream request.
///
/// Rate-limit (429) and ban (418) retries share their own bound. When it
/// runs out the request fails with `RateLimited`, only that chunk is lost,
/// and the next scheduled cycle picks the range up again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts for transient failures, including the first.
    pub max_attempts: u32,
    /// First transient backoff.
    pub base_delay: Duration,
    /// Cap on any computed backoff.
    pub max_backoff: Duration,
    /// First rate-limit backoff.
    pub rate_limit_base_delay: Duration,
    /// Retries allowed after 429/418.
    pub max_rate_limit_retries: u32,
    /// Pause after a 418.
    pub ban_cooldown: Duration,
    /// Jitter factor (0.2 = ±20%); 0 disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            rate_limit_base_delay: Duration::from_millis(config.rate_limit_base_delay_ms),
            max_rate_limit_retries: config.max_rate_limit_retries,
            ban_cooldown: Duration::from_secs(config.ban_cooldown_secs),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting, for tests and dry runs.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_backoff: Duration::ZERO,
            rate_limit_base_delay: Duration::ZERO,
            max_rate_limit_retries: max_attempts,
            ban_cooldown: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Transient backoff before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.ladder(self.base_delay, attempt)
    }

    /// Rate-limit backoff before retry number `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins over the ladder.
    #[must_use]
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.ladder(self.rate_limit_base_delay, attempt))
    }

    /// Start a fresh per-request budget.
    #[must_use]
    pub const fn budget(&self) -> RetryBudget<'_> {
        RetryBudget {
            policy: self,
            transient_attempts: 0,
            rate_limit_retries: 0,
        }
    }

    /// `base * 2^attempt`, capped, with optional jitter.
    fn ladder(&self, base: Duration, attempt: u32) -> Duration {
        let multiplier = 2f64.powi(attempt.min(30) as i32);
        let base_ms = base.as_millis() as f64 * multiplier;
        let capped_ms = base_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(self.apply_jitter(capped_ms) as u64)
    }

    /// Uniform jitter in `[ms * (1 - f), ms * (1 + f)]`.
    fn apply_jitter(&self, ms: f64) -> f64 {
        if self.jitter_factor <= 0.0 || ms <= 0.0 {
            return ms;
        }
        let spread = ms * self.jitter_factor;
        rand::rng().random_range((ms - spread).max(0.0)..=ms + spread)
    }
}

/// Retry bookkeeping for a single request.
#[derive(Debug)]
pub struct RetryBudget<'a> {
    policy: &'a RetryPolicy,
    transient_attempts: u32,
    rate_limit_retries: u32,
}

impl RetryBudget<'_> {
    /// Delay before the next transient retry, or `None` when attempts are spent.
    pub fn next_transient(&mut self) -> Option<Duration> {
        let attempt = self.transient_attempts;
        self.transient_attempts += 1;
        if self.transient_attempts >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.backoff_delay(attempt))
    }

    /// Delay before the next rate-limited retry, or `None` when the budget is spent.
    pub fn next_rate_limited(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.rate_limit_retries >= self.policy.max_rate_limit_retries {
            return None;
        }
        let attempt = self.rate_limit_retries;
        self.rate_limit_retries += 1;
        Some(self.policy.rate_limit_delay(attempt, retry_after))
    }

    /// Consume a rate-limit retry for a ban. Returns `false` when spent.
    pub const fn take_ban_retry(&mut self) -> bool {
        if self.rate_limit_retries >= self.policy.max_rate_limit_retries {
            return false;
        }
        self.rate_limit_retries += 1;
        true
    }

    /// Attempts made so far (transient failures plus the current one).
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.transient_attempts
    }
}

/// Error category for determining retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// HTTP 429.
    RateLimited,
    /// HTTP 418: IP temporarily banned.
    Banned,
    /// Worth retrying with backoff.
    Retryable,
    /// Retrying cannot help.
    NonRetryable,
}

/// Categorize an HTTP error status for retry handling.
#[must_use]
pub const fn categorize_status(status: u16) -> ErrorCategory {
    match status {
        429 => ErrorCategory::RateLimited,
        418 => ErrorCategory::Banned,
        401 | 403 => ErrorCategory::NonRetryable,
        400..=599 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Whether a status is worth retrying at all.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    !matches!(categorize_status(status), ErrorCategory::NonRetryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(429 => ErrorCategory::RateLimited)]
    #[test_case(418 => ErrorCategory::Banned)]
    #[test_case(500 => ErrorCategory::Retryable)]
    #[test_case(503 => ErrorCategory::Retryable)]
    #[test_case(408 => ErrorCategory::Retryable)]
    #[test_case(400 => ErrorCategory::Retryable)]
    #[test_case(401 => ErrorCategory::NonRetryable)]
    #[test_case(403 => ErrorCategory::NonRetryable)]
    fn status_categories(status: u16) -> ErrorCategory {
        categorize_status(status)
    }

    #[test]
    fn retryable_predicate() {
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(3));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(3));
    }

    #[test]
    fn transient_budget_allows_max_attempts() {
        let policy = RetryPolicy::default();
        let mut budget = policy.budget();

        assert_eq!(budget.next_transient(), Some(Duration::from_secs(1)));
        assert_eq!(budget.next_transient(), Some(Duration::from_secs(2)));
        assert_eq!(budget.next_transient(), None);
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn rate_limit_prefers_retry_after() {
        let policy = RetryPolicy::default();
        let mut budget = policy.budget();

        assert_eq!(
            budget.next_rate_limited(Some(Duration::from_secs(7))),
            Some(Duration::from_secs(7))
        );
        assert_eq!(budget.next_rate_limited(None), Some(Duration::from_secs(10)));
    }

    #[test]
    fn rate_limit_budget_is_separate_and_bounded() {
        let policy = RetryPolicy {
            max_rate_limit_retries: 2,
            ..RetryPolicy::default()
        };
        let mut budget = policy.budget();

        assert!(budget.next_rate_limited(None).is_some());
        assert!(budget.take_ban_retry());
        assert!(budget.next_rate_limited(None).is_none());
        assert!(!budget.take_ban_retry());
        assert_eq!(budget.next_transient(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(1).as_millis();
            assert!((1600..=2400).contains(&delay));
        }
    }
}
