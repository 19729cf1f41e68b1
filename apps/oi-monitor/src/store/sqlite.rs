//! SQLite adapter for [`TimeSeriesStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::{
    ANOMALY_COLUMNS, BUCKET_COLUMNS, SCHEMA, UPSERT_ANOMALY, UPSERT_BUCKET, UPSERT_POINT,
};
use super::{StoreError, TimeSeriesStore, WindowQuery};
use crate::domain::{
    AnomalyRecord, Granularity, MetricKind, Symbol, TimePoint, TrackingBucket, from_millis,
};
use crate::observability::metrics;

const IN_MEMORY: &str = ":memory:";

/// Single-connection SQLite store.
///
/// The connection sits behind one mutex; each call holds it for the
/// duration of its statements only.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// `":memory:"` opens a private in-memory database. File databases use
    /// WAL journaling and get their parent directory created if missing.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let open_err = |source| StoreError::Open {
            path: path.to_string(),
            source,
        };

        let conn = if path == IN_MEMORY {
            Connection::open_in_memory().map_err(open_err)?
        } else {
            if let Some(parent) = Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
            let conn = Connection::open(path).map_err(open_err)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(open_err)?;
            conn
        };

        conn.execute_batch(SCHEMA).map_err(open_err)?;

        tracing::info!(path, "Time-series store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_string(),
        })
    }

    /// Open a private in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(IN_MEMORY)
    }

    /// Database path this store was opened with.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run a read, logging and swallowing failures.
    fn read_or_empty<T>(
        &self,
        operation: &'static str,
        read: impl FnOnce(&Connection) -> Result<Vec<T>, StoreError>,
    ) -> Vec<T> {
        let conn = self.conn.lock();
        match read(&conn) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, operation, "Store read failed, returning empty result");
                metrics::record_store_error(operation);
                Vec::new()
            }
        }
    }

    fn upsert_point(conn: &Connection, point: &TimePoint, now_ms: i64) -> Result<(), StoreError> {
        if !point.value.is_finite() {
            return Err(StoreError::InvalidRecord(format!(
                "non-finite {} value for {}",
                point.metric, point.symbol
            )));
        }
        conn.prepare_cached(UPSERT_POINT)?.execute(params![
            point.symbol.as_str(),
            point.metric.as_str(),
            point.granularity.as_str(),
            point.timestamp.timestamp_millis(),
            point.value,
            now_ms,
        ])?;
        Ok(())
    }
}

impl TimeSeriesStore for SqliteStore {
    fn upsert_points(&self, points: &[TimePoint]) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let conn = self.conn.lock();

        let mut written = 0;
        for point in points {
            match Self::upsert_point(&conn, point, now_ms) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        symbol = %point.symbol,
                        metric = %point.metric,
                        ts = %point.timestamp,
                        "Skipping point that failed to upsert"
                    );
                    metrics::record_store_error("upsert_point");
                }
            }
        }
        written
    }

    fn read_window(
        &self,
        symbol: &Symbol,
        metric: MetricKind,
        granularity: Granularity,
        query: WindowQuery,
    ) -> Vec<TimePoint> {
        self.read_or_empty("read_window", |conn| {
            let map_row = |row: &Row<'_>| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?));
            let rows: Vec<(i64, f64)> = match query {
                WindowQuery::Latest(n) => conn
                    .prepare_cached(
                        "SELECT ts, value FROM (
                            SELECT ts, value FROM time_points
                            WHERE symbol = ?1 AND metric = ?2 AND granularity = ?3
                            ORDER BY ts DESC LIMIT ?4
                        ) ORDER BY ts ASC",
                    )?
                    .query_map(
                        params![
                            symbol.as_str(),
                            metric.as_str(),
                            granularity.as_str(),
                            limit_param(n)
                        ],
                        map_row,
                    )?
                    .collect::<Result<_, _>>()?,
                WindowQuery::Range(start, end) => conn
                    .prepare_cached(
                        "SELECT ts, value FROM time_points
                         WHERE symbol = ?1 AND metric = ?2 AND granularity = ?3
                           AND ts >= ?4 AND ts <= ?5
                         ORDER BY ts ASC",
                    )?
                    .query_map(
                        params![
                            symbol.as_str(),
                            metric.as_str(),
                            granularity.as_str(),
                            start.timestamp_millis(),
                            end.timestamp_millis()
                        ],
                        map_row,
                    )?
                    .collect::<Result<_, _>>()?,
            };

            Ok(rows
                .into_iter()
                .filter_map(|(ts, value)| {
                    from_millis(ts)
                        .map(|t| TimePoint::new(symbol.clone(), metric, granularity, t, value))
                })
                .collect())
        })
    }

    fn upsert_tracking_bucket(&self, bucket: &TrackingBucket) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached(UPSERT_BUCKET)?.execute(params![
            bucket.symbol.as_str(),
            bucket.granularity.as_str(),
            bucket.bucket_start.timestamp_millis(),
            bucket.price,
            bucket.volume,
            bucket.open_interest,
            bucket.price_change_pct,
            bucket.volume_change_pct,
            bucket.oi_change_pct,
            Utc::now().timestamp_millis(),
        ])?;
        Ok(())
    }

    fn read_tracking_buckets(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        limit: usize,
    ) -> Vec<TrackingBucket> {
        self.read_or_empty("read_tracking_buckets", |conn| {
            let sql = format!(
                "SELECT {BUCKET_COLUMNS} FROM (
                    SELECT {BUCKET_COLUMNS} FROM tracking_buckets
                    WHERE symbol = ?1 AND granularity = ?2
                    ORDER BY bucket_start DESC LIMIT ?3
                ) ORDER BY bucket_start ASC"
            );
            let rows = conn
                .prepare_cached(&sql)?
                .query_map(
                    params![symbol.as_str(), granularity.as_str(), limit_param(limit)],
                    BucketRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().filter_map(BucketRow::into_bucket).collect())
        })
    }

    fn previous_tracking_bucket(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        bucket_start: DateTime<Utc>,
    ) -> Option<TrackingBucket> {
        self.read_or_empty("previous_tracking_bucket", |conn| {
            let sql = format!(
                "SELECT {BUCKET_COLUMNS} FROM tracking_buckets
                 WHERE symbol = ?1 AND granularity = ?2 AND bucket_start < ?3
                 ORDER BY bucket_start DESC LIMIT 1"
            );
            let row = conn
                .prepare_cached(&sql)?
                .query_row(
                    params![
                        symbol.as_str(),
                        granularity.as_str(),
                        bucket_start.timestamp_millis()
                    ],
                    BucketRow::from_row,
                )
                .optional()?;
            Ok(row.and_then(BucketRow::into_bucket).into_iter().collect())
        })
        .into_iter()
        .next()
    }

    fn upsert_anomaly(&self, record: &AnomalyRecord) -> Result<i64, StoreError> {
        if !record.value.is_finite() || record.z_score.is_some_and(|z| !z.is_finite()) {
            return Err(StoreError::InvalidRecord(format!(
                "non-finite {} anomaly for {}",
                record.kind, record.symbol
            )));
        }

        let conn = self.conn.lock();
        let id = conn.prepare_cached(UPSERT_ANOMALY)?.query_row(
            params![
                record.symbol.as_str(),
                record.timestamp.timestamp_millis(),
                record.kind.as_str(),
                record.granularity.as_str(),
                record.value,
                record.z_score,
                record.severity.as_str(),
                record.message,
                Utc::now().timestamp_millis(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn unnotified_anomalies(&self) -> Vec<AnomalyRecord> {
        self.read_or_empty("unnotified_anomalies", |conn| {
            let sql = format!(
                "SELECT {ANOMALY_COLUMNS} FROM anomalies WHERE notified = 0 ORDER BY ts ASC, id ASC"
            );
            let rows = conn
                .prepare_cached(&sql)?
                .query_map([], AnomalyRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().filter_map(AnomalyRow::into_record).collect())
        })
    }

    fn mark_notified(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached("UPDATE anomalies SET notified = 1 WHERE id = ?1")?
            .execute(params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("anomaly {id}")));
        }
        Ok(())
    }

    fn recent_anomalies(&self, symbol: Option<&Symbol>, limit: usize) -> Vec<AnomalyRecord> {
        self.read_or_empty("recent_anomalies", |conn| {
            let sql = format!(
                "SELECT {ANOMALY_COLUMNS} FROM anomalies
                 WHERE (?1 IS NULL OR symbol = ?1)
                 ORDER BY ts DESC, id DESC LIMIT ?2"
            );
            let rows = conn
                .prepare_cached(&sql)?
                .query_map(
                    params![symbol.map(Symbol::as_str), limit_param(limit)],
                    AnomalyRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().filter_map(AnomalyRow::into_record).collect())
        })
    }
}

/// SQLite takes signed limits.
fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

struct BucketRow {
    symbol: String,
    granularity: String,
    bucket_start: i64,
    price: f64,
    volume: f64,
    open_interest: f64,
    price_change_pct: f64,
    volume_change_pct: f64,
    oi_change_pct: f64,
}

impl BucketRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            granularity: row.get(1)?,
            bucket_start: row.get(2)?,
            price: row.get(3)?,
            volume: row.get(4)?,
            open_interest: row.get(5)?,
            price_change_pct: row.get(6)?,
            volume_change_pct: row.get(7)?,
            oi_change_pct: row.get(8)?,
        })
    }

    fn into_bucket(self) -> Option<TrackingBucket> {
        let granularity = match self.granularity.parse::<Granularity>() {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping tracking bucket with bad granularity");
                return None;
            }
        };
        Some(TrackingBucket {
            symbol: Symbol::new(self.symbol),
            granularity,
            bucket_start: from_millis(self.bucket_start)?,
            price: self.price,
            volume: self.volume,
            open_interest: self.open_interest,
            price_change_pct: self.price_change_pct,
            volume_change_pct: self.volume_change_pct,
            oi_change_pct: self.oi_change_pct,
        })
    }
}

struct AnomalyRow {
    id: i64,
    symbol: String,
    ts: i64,
    kind: String,
    granularity: String,
    value: f64,
    z_score: Option<f64>,
    severity: String,
    message: String,
    notified: bool,
}

impl AnomalyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            symbol: row.get(1)?,
            ts: row.get(2)?,
            kind: row.get(3)?,
            granularity: row.get(4)?,
            value: row.get(5)?,
            z_score: row.get(6)?,
            severity: row.get(7)?,
            message: row.get(8)?,
            notified: row.get(9)?,
        })
    }

    fn into_record(self) -> Option<AnomalyRecord> {
        let parsed = (
            self.kind.parse(),
            self.granularity.parse(),
            self.severity.parse(),
        );
        let (Ok(kind), Ok(granularity), Ok(severity)) = parsed else {
            tracing::warn!(id = self.id, "Skipping anomaly row with unknown labels");
            return None;
        };
        Some(AnomalyRecord {
            id: Some(self.id),
            symbol: Symbol::new(self.symbol),
            timestamp: from_millis(self.ts)?,
            kind,
            granularity,
            value: self.value,
            z_score: self.z_score,
            severity,
            message: self.message,
            notified: self.notified,
        })
    }
}
