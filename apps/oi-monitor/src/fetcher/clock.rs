//! Time sources for the fetcher: sleeping, pacing and server clock offset.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Something that can wait. Injected so retry behavior is testable.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and records every requested wait.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of all requested waits.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Enforces a minimum interval between calls and ban cooldowns.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Debug, Default)]
struct LimiterState {
    last_call: Option<Instant>,
    banned_until: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum spacing.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Time to wait before the next call may start, measured at `now`.
    fn wait_needed(&self, now: Instant) -> Duration {
        let state = self.state.lock();
        let spacing = state
            .last_call
            .map(|last| (last + self.min_interval).saturating_duration_since(now))
            .unwrap_or_default();
        let ban = state
            .banned_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();
        spacing.max(ban)
    }

    /// Wait until a call is allowed, then claim the slot.
    pub async fn acquire(&self, sleeper: &dyn Sleeper) {
        let wait = self.wait_needed(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis(), "Pacing upstream request");
            sleeper.sleep(wait).await;
        }
        let mut state = self.state.lock();
        state.last_call = Some(Instant::now());
        state.banned_until = None;
    }

    /// Block every call for `cooldown` from now.
    pub fn impose_ban(&self, cooldown: Duration) {
        self.state.lock().banned_until = Some(Instant::now() + cooldown);
    }
}

/// Cached offset between the exchange clock and the local clock.
#[derive(Debug)]
pub struct ServerClock {
    ttl: Duration,
    cached: Mutex<Option<CachedOffset>>,
}

#[derive(Debug, Clone, Copy)]
struct CachedOffset {
    offset_ms: i64,
    fetched_at: Instant,
}

impl ServerClock {
    /// Create a clock whose offset is valid for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Offset in milliseconds, if one was stored within the TTL.
    #[must_use]
    pub fn fresh_offset(&self) -> Option<i64> {
        self.cached
            .lock()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.offset_ms)
    }

    /// Store the offset observed from a server timestamp.
    pub fn record(&self, server_time: DateTime<Utc>, local_time: DateTime<Utc>) -> i64 {
        let offset_ms = (server_time - local_time).num_milliseconds();
        *self.cached.lock() = Some(CachedOffset {
            offset_ms,
            fetched_at: Instant::now(),
        });
        offset_ms
    }

    /// Local time shifted by `offset_ms`.
    #[must_use]
    pub fn apply(offset_ms: i64, local_time: DateTime<Utc>) -> DateTime<Utc> {
        local_time + chrono::Duration::milliseconds(offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn recording_sleeper_records_without_waiting() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(60)).await;
        sleeper.sleep(Duration::from_secs(2)).await;

        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(60), Duration::from_secs(2)]
        );
        assert_eq!(sleeper.total(), Duration::from_secs(62));
    }

    #[tokio::test]
    async fn limiter_spaces_consecutive_calls() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let sleeper = RecordingSleeper::new();

        limiter.acquire(&sleeper).await;
        limiter.acquire(&sleeper).await;

        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn limiter_waits_out_ban() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let sleeper = RecordingSleeper::new();

        limiter.impose_ban(Duration::from_secs(60));
        limiter.acquire(&sleeper).await;
        limiter.acquire(&sleeper).await;

        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] > Duration::from_secs(59));
    }

    #[test]
    fn server_clock_caches_offset() {
        let clock = ServerClock::new(Duration::from_secs(300));
        assert_eq!(clock.fresh_offset(), None);

        let local = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let server = local + chrono::Duration::milliseconds(1500);
        assert_eq!(clock.record(server, local), 1500);
        assert_eq!(clock.fresh_offset(), Some(1500));
        assert_eq!(ServerClock::apply(1500, local), server);
    }

    #[test]
    fn server_clock_expires() {
        let clock = ServerClock::new(Duration::ZERO);
        let now = Utc::now();
        clock.record(now, now);
        assert_eq!(clock.fresh_offset(), None);
    }
}
