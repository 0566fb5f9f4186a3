//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as `YYYY-MM-DD`
//! and times of day as `HH:MM:SS`. Enums are stored in their snake_case
//! string form. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use marquee_core::{
  dimension::{VenueAttrs, VenueVersion},
  fact::{DimensionRefs, EventFact, FactMeasures},
  keys::{EventKey, VenueKey},
  quality::{QualityCheckResult, QualityStatus},
  raw::{RawFields, RawRecord},
  run::{RunKind, RunReport, RunStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps, dates and times ─────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_time(t: NaiveTime) -> String { t.format(TIME_FORMAT).to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_quality_status(s: &str) -> Result<QualityStatus> {
  QualityStatus::from_str(s)
    .map_err(|_| marquee_core::Error::UnknownQualityStatus(s.to_owned()).into())
}

pub fn decode_run_kind(s: &str) -> Result<RunKind> {
  RunKind::from_str(s).map_err(|_| marquee_core::Error::UnknownRunKind(s.to_owned()).into())
}

pub fn decode_run_status(s: &str) -> Result<RunStatus> {
  RunStatus::from_str(s).map_err(|_| marquee_core::Error::UnknownRunStatus(s.to_owned()).into())
}

/// SQLite has no boolean type; flags are `0`/`1` integers.
pub fn decode_flag(column: &'static str, v: i64) -> Result<bool> {
  match v {
    0 => Ok(false),
    1 => Ok(true),
    other => Err(Error::Decode { column, value: other.to_string() }),
  }
}

/// Convert a decode failure into a rusqlite error so it can surface from
/// inside a `Connection::call` closure.
pub fn into_sql_error(e: Error) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns read directly from a `raw_events` row.
pub struct RawLanded {
  pub raw_id:       i64,
  pub source:       String,
  pub source_id:    String,
  pub payload_json: Option<String>,
  pub fields:       RawFields,
  pub ingested_at:  String,
  pub is_processed: i64,
}

/// Column list matching [`RawLanded::from_row`].
pub const RAW_EVENT_COLUMNS: &str = "raw_id, source, source_id, payload_json,
  event_name, event_date, event_time, venue_name, venue_city, venue_country,
  venue_lat, venue_lon, category, subcategory, price_min, price_max, currency,
  url, status, ingested_at, is_processed";

impl RawLanded {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      raw_id:       row.get(0)?,
      source:       row.get(1)?,
      source_id:    row.get(2)?,
      payload_json: row.get(3)?,
      fields:       RawFields {
        event_name:    row.get(4)?,
        event_date:    row.get(5)?,
        event_time:    row.get(6)?,
        venue_name:    row.get(7)?,
        venue_city:    row.get(8)?,
        venue_country: row.get(9)?,
        venue_lat:     row.get(10)?,
        venue_lon:     row.get(11)?,
        category:      row.get(12)?,
        subcategory:   row.get(13)?,
        price_min:     row.get(14)?,
        price_max:     row.get(15)?,
        currency:      row.get(16)?,
        url:           row.get(17)?,
        status:        row.get(18)?,
      },
      ingested_at:  row.get(19)?,
      is_processed: row.get(20)?,
    })
  }

  pub fn into_record(self) -> Result<RawRecord> {
    let payload = self
      .payload_json
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(RawRecord {
      raw_id: self.raw_id,
      source: self.source,
      source_id: self.source_id,
      payload,
      fields: self.fields,
      ingested_at: decode_dt(&self.ingested_at)?,
      processed: decode_flag("is_processed", self.is_processed)?,
    })
  }
}

/// Raw columns read directly from a `dim_venue` row.
pub struct RawVenue {
  pub venue_id:   i64,
  pub venue_key:  String,
  pub name:       String,
  pub city:       Option<String>,
  pub country:    Option<String>,
  pub lat:        Option<f64>,
  pub lon:        Option<f64>,
  pub valid_from: String,
  pub valid_to:   Option<String>,
  pub is_current: i64,
}

pub const VENUE_COLUMNS: &str =
  "venue_id, venue_key, name, city, country, lat, lon, valid_from, valid_to, is_current";

impl RawVenue {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      venue_id:   row.get(0)?,
      venue_key:  row.get(1)?,
      name:       row.get(2)?,
      city:       row.get(3)?,
      country:    row.get(4)?,
      lat:        row.get(5)?,
      lon:        row.get(6)?,
      valid_from: row.get(7)?,
      valid_to:   row.get(8)?,
      is_current: row.get(9)?,
    })
  }

  pub fn into_version(self) -> Result<VenueVersion> {
    Ok(VenueVersion {
      venue_id:   self.venue_id,
      venue_key:  VenueKey::from_stored(self.venue_key),
      attrs:      VenueAttrs {
        name:    self.name,
        city:    self.city,
        country: self.country,
        lat:     self.lat,
        lon:     self.lon,
      },
      valid_from: decode_date(&self.valid_from)?,
      valid_to:   self.valid_to.as_deref().map(decode_date).transpose()?,
      is_current: decode_flag("is_current", self.is_current)?,
    })
  }
}

/// Raw columns read directly from a `fact_events` row.
pub struct RawFact {
  pub fact_id:          i64,
  pub event_key:        String,
  pub source:           String,
  pub source_event_id:  String,
  pub date_id:          Option<i64>,
  pub venue_id:         Option<i64>,
  pub category_id:      Option<i64>,
  pub source_dim_id:    Option<i64>,
  pub event_name:       String,
  pub event_date:       Option<String>,
  pub event_time:       Option<String>,
  pub url:              Option<String>,
  pub status:           Option<String>,
  pub price_min:        Option<f64>,
  pub price_max:        Option<f64>,
  pub price_avg:        Option<f64>,
  pub currency:         Option<String>,
  pub price_normalized: Option<f64>,
  pub is_deleted:       i64,
  pub loaded_at:        String,
  pub updated_at:       String,
}

pub const FACT_COLUMNS: &str = "fact_id, event_key, source, source_event_id,
  date_id, venue_id, category_id, source_dim_id, event_name, event_date,
  event_time, url, status, price_min, price_max, price_avg, currency,
  price_normalized, is_deleted, loaded_at, updated_at";

impl RawFact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fact_id:          row.get(0)?,
      event_key:        row.get(1)?,
      source:           row.get(2)?,
      source_event_id:  row.get(3)?,
      date_id:          row.get(4)?,
      venue_id:         row.get(5)?,
      category_id:      row.get(6)?,
      source_dim_id:    row.get(7)?,
      event_name:       row.get(8)?,
      event_date:       row.get(9)?,
      event_time:       row.get(10)?,
      url:              row.get(11)?,
      status:           row.get(12)?,
      price_min:        row.get(13)?,
      price_max:        row.get(14)?,
      price_avg:        row.get(15)?,
      currency:         row.get(16)?,
      price_normalized: row.get(17)?,
      is_deleted:       row.get(18)?,
      loaded_at:        row.get(19)?,
      updated_at:       row.get(20)?,
    })
  }

  pub fn into_fact(self) -> Result<EventFact> {
    Ok(EventFact {
      fact_id:    self.fact_id,
      event_key:  EventKey::from_stored(self.event_key),
      source:     self.source,
      source_id:  self.source_event_id,
      refs:       DimensionRefs {
        date_id:     self.date_id,
        venue_id:    self.venue_id,
        category_id: self.category_id,
        source_id:   self.source_dim_id,
      },
      event_name: self.event_name,
      event_date: self.event_date.as_deref().map(decode_date).transpose()?,
      event_time: self.event_time.as_deref().map(decode_time).transpose()?,
      url:        self.url,
      measures:   FactMeasures {
        status:           self.status,
        price_min:        self.price_min,
        price_max:        self.price_max,
        price_avg:        self.price_avg,
        currency:         self.currency,
        price_normalized: self.price_normalized,
      },
      is_deleted: decode_flag("is_deleted", self.is_deleted)?,
      loaded_at:  decode_dt(&self.loaded_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw columns read directly from a `quality_log` row.
pub struct RawQualityResult {
  pub run_id:          String,
  pub check_name:      String,
  pub population:      String,
  pub records_checked: i64,
  pub records_failed:  i64,
  pub pass_rate:       f64,
  pub status:          String,
  pub checked_at:      String,
}

impl RawQualityResult {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:          row.get(0)?,
      check_name:      row.get(1)?,
      population:      row.get(2)?,
      records_checked: row.get(3)?,
      records_failed:  row.get(4)?,
      pass_rate:       row.get(5)?,
      status:          row.get(6)?,
      checked_at:      row.get(7)?,
    })
  }

  pub fn into_result(self) -> Result<QualityCheckResult> {
    Ok(QualityCheckResult {
      run_id:          decode_uuid(&self.run_id)?,
      check_name:      self.check_name,
      population:      self.population,
      records_checked: self.records_checked as u64,
      records_failed:  self.records_failed as u64,
      pass_rate:       self.pass_rate,
      status:          decode_quality_status(&self.status)?,
      checked_at:      decode_dt(&self.checked_at)?,
    })
  }
}

/// Raw columns read directly from a `run_log` row.
pub struct RawRun {
  pub run_id:            String,
  pub kind:              String,
  pub status:            String,
  pub started_at:        String,
  pub finished_at:       Option<String>,
  pub records_fetched:   i64,
  pub records_loaded:    i64,
  pub records_skipped:   i64,
  pub records_processed: i64,
  pub quality:           Option<String>,
  pub error_message:     Option<String>,
}

impl RawRun {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:            row.get(0)?,
      kind:              row.get(1)?,
      status:            row.get(2)?,
      started_at:        row.get(3)?,
      finished_at:       row.get(4)?,
      records_fetched:   row.get(5)?,
      records_loaded:    row.get(6)?,
      records_skipped:   row.get(7)?,
      records_processed: row.get(8)?,
      quality:           row.get(9)?,
      error_message:     row.get(10)?,
    })
  }

  pub fn into_report(self) -> Result<RunReport> {
    Ok(RunReport {
      run_id:            decode_uuid(&self.run_id)?,
      kind:              decode_run_kind(&self.kind)?,
      status:            decode_run_status(&self.status)?,
      started_at:        decode_dt(&self.started_at)?,
      finished_at:       self.finished_at.as_deref().map(decode_dt).transpose()?,
      records_fetched:   self.records_fetched as u64,
      records_loaded:    self.records_loaded as u64,
      records_skipped:   self.records_skipped as u64,
      records_processed: self.records_processed as u64,
      quality:           self.quality.as_deref().map(decode_quality_status).transpose()?,
      error_message:     self.error_message,
    })
  }
}
