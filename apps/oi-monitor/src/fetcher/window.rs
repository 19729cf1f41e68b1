//! Range clamping, chunk planning and chunk merging.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::Granularity;

/// Pagination limits of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLimits {
    /// Rows returned per call.
    pub page_size: u32,
    /// Widest span one call may cover, if the endpoint has such a limit.
    pub max_span: Option<Duration>,
    /// Oldest data the endpoint serves, relative to now.
    pub lookback: Duration,
}

impl EndpointLimits {
    /// Span one chunk covers at `granularity`.
    #[must_use]
    pub fn chunk_span(&self, granularity: Granularity) -> Duration {
        let by_page = granularity.period() * i32::try_from(self.page_size).unwrap_or(i32::MAX);
        self.max_span.map_or(by_page, |max| by_page.min(max))
    }
}

/// A validated, non-empty time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

/// Clamp a requested range to what the endpoint can serve.
///
/// - `start` moves forward to `now - lookback` and to `listed_after`
/// - `end` moves back to `now`
///
/// Returns `None` when nothing is left of the range.
#[must_use]
pub fn clamp_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    lookback: Duration,
    listed_after: Option<DateTime<Utc>>,
) -> Option<ClampedWindow> {
    let oldest = now - lookback;
    let mut clamped_start = start.max(oldest);
    if let Some(listed) = listed_after {
        clamped_start = clamped_start.max(listed);
    }
    let clamped_end = end.min(now);

    if clamped_start != start || clamped_end != end {
        tracing::debug!(
            requested_start = %start,
            requested_end = %end,
            start = %clamped_start,
            end = %clamped_end,
            "Clamped fetch window"
        );
    }

    (clamped_start < clamped_end).then_some(ClampedWindow {
        start: clamped_start,
        end: clamped_end,
    })
}

/// Split a window into chunks the endpoint can serve in one call.
///
/// Chunks are planned backward from the window end and returned in
/// ascending order, so a plan truncated at `max_chunks` drops the oldest
/// range. Consecutive chunks overlap by one period, or by a quarter of the
/// span when the span is no wider than one period.
#[must_use]
pub fn plan_chunks(
    window: ClampedWindow,
    granularity: Granularity,
    limits: &EndpointLimits,
    max_chunks: usize,
) -> Vec<ClampedWindow> {
    let span = limits.chunk_span(granularity);
    let overlap = if span > granularity.period() {
        granularity.period()
    } else {
        span / 4
    };
    let step = span - overlap;
    if step <= Duration::zero() {
        return vec![window];
    }

    let mut chunks = Vec::new();
    let mut cursor = window.end;
    while chunks.len() < max_chunks {
        let chunk_start = (cursor - span).max(window.start);
        chunks.push(ClampedWindow {
            start: chunk_start,
            end: cursor,
        });
        if chunk_start <= window.start {
            chunks.reverse();
            return chunks;
        }
        cursor -= step;
    }

    tracing::warn!(
        max_chunks,
        start = %window.start,
        end = %window.end,
        planned_from = %chunks.last().map_or(window.end, |c| c.start),
        "Fetch window truncated at chunk limit, oldest range dropped"
    );
    chunks.reverse();
    chunks
}

/// A row carrying its own timestamp.
pub trait Timestamped {
    /// Row timestamp.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Merge chunk rows: one row per timestamp (later rows win), ascending,
/// restricted to `window`.
#[must_use]
pub fn merge_by_timestamp<T: Timestamped>(
    rows: impl IntoIterator<Item = T>,
    window: ClampedWindow,
) -> Vec<T> {
    let mut by_ts = BTreeMap::new();
    for row in rows {
        let ts = row.timestamp();
        if ts >= window.start && ts <= window.end {
            by_ts.insert(ts, row);
        }
    }
    by_ts.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    #[derive(Debug, PartialEq)]
    struct Row(DateTime<Utc>, f64);

    impl Timestamped for Row {
        fn timestamp(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn limits(page_size: u32, max_span: Option<Duration>) -> EndpointLimits {
        EndpointLimits {
            page_size,
            max_span,
            lookback: Duration::days(30),
        }
    }

    #[test]
    fn start_is_clamped_to_lookback() {
        let window = clamp_window(
            now() - Duration::days(45),
            now(),
            now(),
            Duration::days(30),
            None,
        )
        .unwrap();
        assert_eq!(window.start, now() - Duration::days(30));
        assert_eq!(window.end, now());
    }

    #[test]
    fn end_is_clamped_to_now() {
        let window = clamp_window(
            now() - Duration::hours(2),
            now() + Duration::hours(5),
            now(),
            Duration::days(30),
            None,
        )
        .unwrap();
        assert_eq!(window.end, now());
    }

    #[test]
    fn start_moves_past_listing() {
        let listed = now() - Duration::days(3);
        let window = clamp_window(
            now() - Duration::days(10),
            now(),
            now(),
            Duration::days(30),
            Some(listed),
        )
        .unwrap();
        assert_eq!(window.start, listed);
    }

    #[test]
    fn future_or_inverted_range_is_empty() {
        assert!(
            clamp_window(
                now() + Duration::hours(1),
                now() + Duration::hours(5),
                now(),
                Duration::days(30),
                None
            )
            .is_none()
        );
        assert!(
            clamp_window(
                now() - Duration::hours(1),
                now() - Duration::hours(5),
                now(),
                Duration::days(30),
                None
            )
            .is_none()
        );
    }

    #[test]
    fn chunk_span_respects_endpoint_cap() {
        let capped = limits(500, Some(Duration::hours(24)));
        assert_eq!(capped.chunk_span(Granularity::Hourly), Duration::hours(24));
        let paged = limits(10, None);
        assert_eq!(paged.chunk_span(Granularity::Hourly), Duration::hours(10));
    }

    #[test]
    fn chunks_overlap_by_one_period_and_cover_window() {
        let window = ClampedWindow {
            start: now() - Duration::hours(48),
            end: now(),
        };
        let chunks = plan_chunks(
            window,
            Granularity::Hourly,
            &limits(500, Some(Duration::hours(24))),
            60,
        );

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, window.start);
        assert_eq!(chunks[1].start, chunks[0].end - Duration::hours(1));
        assert_eq!(chunks[2].start, chunks[1].end - Duration::hours(1));
        assert_eq!(chunks.last().unwrap().end, window.end);
    }

    #[test]
    fn single_chunk_when_window_fits() {
        let window = ClampedWindow {
            start: now() - Duration::hours(5),
            end: now(),
        };
        let chunks = plan_chunks(window, Granularity::Hourly, &limits(500, None), 60);
        assert_eq!(chunks, vec![window]);
    }

    #[test]
    fn chunk_count_is_capped() {
        let window = ClampedWindow {
            start: now() - Duration::days(30),
            end: now(),
        };
        let chunks = plan_chunks(window, Granularity::Hourly, &limits(2, None), 5);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.last().unwrap().end, window.end);
        assert!(chunks.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn truncated_plan_keeps_the_newest_range() {
        let window = ClampedWindow {
            start: now() - Duration::hours(100),
            end: now(),
        };
        let chunks = plan_chunks(window, Granularity::Hourly, &limits(10, None), 3);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].end, window.end);
        assert_eq!(chunks[2].start, now() - Duration::hours(10));
        assert!(chunks[0].start > window.start);
    }

    #[test]
    fn daily_chunks_overlap_when_span_is_one_period() {
        let window = ClampedWindow {
            start: now() - Duration::days(5),
            end: now(),
        };
        let chunks = plan_chunks(
            window,
            Granularity::Daily,
            &limits(500, Some(Duration::hours(24))),
            60,
        );

        assert_eq!(chunks[0].start, window.start);
        assert_eq!(chunks.last().unwrap().end, window.end);
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end);
            assert_eq!(pair[0].end - pair[1].start, Duration::hours(6));
        }
        assert!(chunks.iter().all(|c| c.end - c.start <= Duration::hours(24)));
    }

    #[test]
    fn merge_dedups_overlap_and_sorts() {
        let t = |h: i64| now() - Duration::hours(h);
        let window = ClampedWindow {
            start: t(10),
            end: now(),
        };
        let rows = vec![
            Row(t(3), 3.0),
            Row(t(2), 2.0),
            Row(t(2), 2.5),
            Row(t(5), 5.0),
            Row(t(20), 20.0),
        ];

        let merged = merge_by_timestamp(rows, window);
        assert_eq!(
            merged,
            vec![Row(t(5), 5.0), Row(t(3), 3.0), Row(t(2), 2.5)]
        );
    }
}
