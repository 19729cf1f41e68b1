//! Time-series store.
//!
//! Defines the persistence port used by the collector, detector, notifier
//! and reports, plus its SQLite adapter.
//!
//! Semantics shared by every implementation:
//! - point, bucket and anomaly writes are keyed upserts (last write wins)
//! - anomaly upserts never reset `notified`
//! - reads return an empty sequence on failure; the failure is logged

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{AnomalyRecord, Granularity, MetricKind, Symbol, TimePoint, TrackingBucket};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the database directory.
    #[error("Failed to create database directory '{path}': {source}")]
    CreateDir {
        /// Directory path.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to open the database or create its schema.
    #[error("Failed to open database '{path}': {source}")]
    Open {
        /// Database path.
        path: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// A statement failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record cannot be stored as given.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// No row matched.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Which part of a series to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowQuery {
    /// The most recent `n` points.
    Latest(usize),
    /// Every point with `start <= timestamp <= end`.
    Range(DateTime<Utc>, DateTime<Utc>),
}

/// Persistence port for series, tracking buckets and anomalies.
///
/// All sequences are returned in ascending timestamp order unless the
/// method says otherwise.
pub trait TimeSeriesStore: Send + Sync {
    /// Upsert points one row at a time. A failing row is logged and skipped.
    ///
    /// Returns the number of rows written.
    fn upsert_points(&self, points: &[TimePoint]) -> usize;

    /// Read a window of one series.
    fn read_window(
        &self,
        symbol: &Symbol,
        metric: MetricKind,
        granularity: Granularity,
        query: WindowQuery,
    ) -> Vec<TimePoint>;

    /// Insert or update the bucket keyed by `(symbol, granularity, bucket_start)`.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn upsert_tracking_bucket(&self, bucket: &TrackingBucket) -> Result<(), StoreError>;

    /// The latest `limit` buckets of one symbol and granularity.
    fn read_tracking_buckets(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        limit: usize,
    ) -> Vec<TrackingBucket>;

    /// The newest bucket strictly before `bucket_start`.
    fn previous_tracking_bucket(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        bucket_start: DateTime<Utc>,
    ) -> Option<TrackingBucket>;

    /// Insert or update an anomaly, preserving `notified` on conflict.
    ///
    /// Returns the row id.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn upsert_anomaly(&self, record: &AnomalyRecord) -> Result<i64, StoreError>;

    /// Every anomaly not yet delivered, oldest first.
    fn unnotified_anomalies(&self) -> Vec<AnomalyRecord>;

    /// Flag an anomaly as delivered. The flag is never cleared.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no anomaly has this id.
    fn mark_notified(&self, id: i64) -> Result<(), StoreError>;

    /// The newest `limit` anomalies, optionally for one symbol, newest first.
    fn recent_anomalies(&self, symbol: Option<&Symbol>, limit: usize) -> Vec<AnomalyRecord>;
}
