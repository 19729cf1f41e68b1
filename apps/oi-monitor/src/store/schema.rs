//! SQLite schema. Every statement is idempotent.

/// Tables and indexes created when the store opens.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS time_points (
    symbol      TEXT    NOT NULL,
    metric      TEXT    NOT NULL,
    granularity TEXT    NOT NULL,
    ts          INTEGER NOT NULL,
    value       REAL    NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (symbol, metric, granularity, ts)
);

CREATE TABLE IF NOT EXISTS tracking_buckets (
    symbol            TEXT    NOT NULL,
    granularity       TEXT    NOT NULL,
    bucket_start      INTEGER NOT NULL,
    price             REAL    NOT NULL,
    volume            REAL    NOT NULL,
    open_interest     REAL    NOT NULL,
    price_change_pct  REAL    NOT NULL DEFAULT 0,
    volume_change_pct REAL    NOT NULL DEFAULT 0,
    oi_change_pct     REAL    NOT NULL DEFAULT 0,
    updated_at        INTEGER NOT NULL,
    PRIMARY KEY (symbol, granularity, bucket_start)
);

CREATE TABLE IF NOT EXISTS anomalies (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol      TEXT    NOT NULL,
    ts          INTEGER NOT NULL,
    kind        TEXT    NOT NULL,
    granularity TEXT    NOT NULL,
    value       REAL    NOT NULL,
    z_score     REAL,
    severity    TEXT    NOT NULL,
    message     TEXT    NOT NULL,
    notified    INTEGER NOT NULL DEFAULT 0,
    detected_at INTEGER NOT NULL,
    UNIQUE (symbol, ts, kind, granularity)
);

CREATE INDEX IF NOT EXISTS idx_anomalies_notified ON anomalies (notified, ts);
CREATE INDEX IF NOT EXISTS idx_anomalies_symbol_ts ON anomalies (symbol, ts);
";

pub const UPSERT_POINT: &str = "
INSERT INTO time_points (symbol, metric, granularity, ts, value, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (symbol, metric, granularity, ts) DO UPDATE SET
    value = excluded.value,
    updated_at = excluded.updated_at
";

pub const UPSERT_BUCKET: &str = "
INSERT INTO tracking_buckets (
    symbol, granularity, bucket_start, price, volume, open_interest,
    price_change_pct, volume_change_pct, oi_change_pct, updated_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT (symbol, granularity, bucket_start) DO UPDATE SET
    price = excluded.price,
    volume = excluded.volume,
    open_interest = excluded.open_interest,
    price_change_pct = excluded.price_change_pct,
    volume_change_pct = excluded.volume_change_pct,
    oi_change_pct = excluded.oi_change_pct,
    updated_at = excluded.updated_at
";

// Conflicts keep the stored `notified` flag.
pub const UPSERT_ANOMALY: &str = "
INSERT INTO anomalies (
    symbol, ts, kind, granularity, value, z_score, severity, message, notified, detected_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
ON CONFLICT (symbol, ts, kind, granularity) DO UPDATE SET
    value = excluded.value,
    z_score = excluded.z_score,
    severity = excluded.severity,
    message = excluded.message
RETURNING id
";

pub const ANOMALY_COLUMNS: &str =
    "id, symbol, ts, kind, granularity, value, z_score, severity, message, notified";

pub const BUCKET_COLUMNS: &str = "symbol, granularity, bucket_start, price, volume, open_interest, \
     price_change_pct, volume_change_pct, oi_change_pct";
