//! SQL schema for the Marquee SQLite warehouse.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Landing store. Append-only; the only UPDATE ever issued flips
-- is_processed from 0 to 1.
CREATE TABLE IF NOT EXISTS raw_events (
    raw_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    source        TEXT NOT NULL,
    source_id     TEXT NOT NULL,
    event_key     TEXT NOT NULL,   -- derived from (source, source_id)
    payload_json  TEXT,
    event_name    TEXT,
    event_date    TEXT,
    event_time    TEXT,
    venue_name    TEXT,
    venue_city    TEXT,
    venue_country TEXT,
    venue_lat     TEXT,
    venue_lon     TEXT,
    category      TEXT,
    subcategory   TEXT,
    price_min     TEXT,
    price_max     TEXT,
    currency      TEXT,
    url           TEXT,
    status        TEXT,
    ingested_at   TEXT NOT NULL,   -- RFC 3339 UTC
    is_processed  INTEGER NOT NULL DEFAULT 0 CHECK (is_processed IN (0, 1))
);

CREATE TABLE IF NOT EXISTS dim_date (
    date_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    full_date   TEXT NOT NULL UNIQUE,   -- YYYY-MM-DD
    day_of_week INTEGER NOT NULL,
    day_name    TEXT NOT NULL,
    week        INTEGER NOT NULL,
    month       INTEGER NOT NULL,
    month_name  TEXT NOT NULL,
    quarter     INTEGER NOT NULL,
    year        INTEGER NOT NULL,
    is_weekend  INTEGER NOT NULL
);

-- Versioned (SCD type 2). At most one current version per venue_key.
CREATE TABLE IF NOT EXISTS dim_venue (
    venue_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    venue_key  TEXT NOT NULL,
    name       TEXT NOT NULL,
    city       TEXT,
    country    TEXT,
    lat        REAL,
    lon        REAL,
    valid_from TEXT NOT NULL,
    valid_to   TEXT,
    is_current INTEGER NOT NULL DEFAULT 1 CHECK (is_current IN (0, 1)),
    CHECK (is_current = 1 OR valid_to IS NOT NULL)
);

CREATE UNIQUE INDEX IF NOT EXISTS dim_venue_current_uq
    ON dim_venue(venue_key) WHERE is_current = 1;

CREATE TABLE IF NOT EXISTS dim_category (
    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
    category    TEXT NOT NULL,
    subcategory TEXT NOT NULL,
    UNIQUE (category, subcategory)
);

CREATE TABLE IF NOT EXISTS dim_source (
    source_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL   -- 'api' | 'file' | 'manual' | 'unknown'
);

-- Upserted by event_key; never hard-deleted.
CREATE TABLE IF NOT EXISTS fact_events (
    fact_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    event_key        TEXT NOT NULL UNIQUE,
    source           TEXT NOT NULL,
    source_event_id  TEXT NOT NULL,
    date_id          INTEGER REFERENCES dim_date(date_id),
    venue_id         INTEGER REFERENCES dim_venue(venue_id),
    category_id      INTEGER REFERENCES dim_category(category_id),
    source_dim_id    INTEGER REFERENCES dim_source(source_id),
    event_name       TEXT NOT NULL,
    event_date       TEXT,
    event_time       TEXT,
    url              TEXT,
    status           TEXT,
    price_min        REAL,
    price_max        REAL,
    price_avg        REAL,
    currency         TEXT,
    price_normalized REAL,
    is_deleted       INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    loaded_at        TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Append-only; no UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS quality_log (
    check_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id          TEXT NOT NULL,
    check_name      TEXT NOT NULL,
    population      TEXT NOT NULL,
    records_checked INTEGER NOT NULL,
    records_failed  INTEGER NOT NULL,
    pass_rate       REAL NOT NULL,
    status          TEXT NOT NULL,   -- 'passed' | 'warning' | 'failed'
    checked_at      TEXT NOT NULL,
    UNIQUE (run_id, check_name)
);

CREATE TABLE IF NOT EXISTS run_log (
    run_id            TEXT PRIMARY KEY,
    kind              TEXT NOT NULL,   -- 'land' | 'full' | 'quality'
    status            TEXT NOT NULL,   -- 'running' | 'success' | 'failed'
    started_at        TEXT NOT NULL,
    finished_at       TEXT,
    records_fetched   INTEGER NOT NULL DEFAULT 0,
    records_loaded    INTEGER NOT NULL DEFAULT 0,
    records_skipped   INTEGER NOT NULL DEFAULT 0,
    records_processed INTEGER NOT NULL DEFAULT 0,
    quality           TEXT,
    error_message     TEXT
);

CREATE INDEX IF NOT EXISTS raw_events_unprocessed_idx ON raw_events(is_processed);
CREATE INDEX IF NOT EXISTS raw_events_key_idx         ON raw_events(event_key);
CREATE INDEX IF NOT EXISTS dim_venue_key_idx          ON dim_venue(venue_key);
CREATE INDEX IF NOT EXISTS quality_log_checked_idx    ON quality_log(checked_at);

PRAGMA user_version = 1;
";
