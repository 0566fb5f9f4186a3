//! The staging normalizer: a pure transform from a landed [`RawRecord`] to a
//! typed [`StagedRecord`].
//!
//! Normalization never fails. A field that does not validate becomes `None`
//! and is left for the quality gate to score; only a missing event name makes
//! a record unusable downstream, and even that is decided by the reconciler,
//! not here.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{keys::EventKey, raw::RawRecord};

pub const DEFAULT_CATEGORY: &str = "Unknown";
pub const DEFAULT_SUBCATEGORY: &str = "General";

// ─── Lexical patterns ────────────────────────────────────────────────────────

fn date_re() -> &'static Regex {
  static DATE_RE: OnceLock<Regex> = OnceLock::new();
  DATE_RE.get_or_init(|| {
    Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("valid date regex")
  })
}

fn time_re() -> &'static Regex {
  static TIME_RE: OnceLock<Regex> = OnceLock::new();
  TIME_RE.get_or_init(|| {
    Regex::new(r"^([0-9]{2}):([0-9]{2})(?::([0-9]{2}))?").expect("valid time regex")
  })
}

fn price_re() -> &'static Regex {
  static PRICE_RE: OnceLock<Regex> = OnceLock::new();
  PRICE_RE.get_or_init(|| {
    Regex::new(r"^[0-9]+(?:\.[0-9]+)?$").expect("valid price regex")
  })
}

fn coordinate_re() -> &'static Regex {
  static COORDINATE_RE: OnceLock<Regex> = OnceLock::new();
  COORDINATE_RE.get_or_init(|| {
    Regex::new(r"^[+-]?[0-9]+(?:\.[0-9]+)?$").expect("valid coordinate regex")
  })
}

// ─── Field rules ─────────────────────────────────────────────────────────────

/// Trim, and collapse blank strings to `None`.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
  raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Capitalise the first letter of every alphanumeric run and lower-case the
/// rest: `"mERCEDES-benz arena"` becomes `"Mercedes-Benz Arena"`.
pub fn title_case(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut at_word_start = true;
  for c in s.chars() {
    if c.is_alphanumeric() {
      if at_word_start {
        out.extend(c.to_uppercase());
      } else {
        out.extend(c.to_lowercase());
      }
      at_word_start = false;
    } else {
      out.push(c);
      at_word_start = true;
    }
  }
  out
}

/// [`clean_text`] followed by [`title_case`]; the rule for names and places.
pub fn proper_noun(raw: Option<&str>) -> Option<String> {
  clean_text(raw).map(|s| title_case(&s))
}

/// Whether `raw` matches the strict `YYYY-MM-DD` lexical pattern. Says nothing
/// about whether the date exists on the calendar.
pub fn is_strict_date(raw: &str) -> bool { date_re().is_match(raw.trim()) }

/// Parse a strict `YYYY-MM-DD` date. Lexically valid but impossible dates
/// (`2024-02-30`) are rejected too.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
  let caps = date_re().captures(raw?.trim())?;
  let year = caps[1].parse().ok()?;
  let month = caps[2].parse().ok()?;
  let day = caps[3].parse().ok()?;
  NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse an `HH:MM[...]` time; anything after the optional `:SS` is ignored.
pub fn parse_time(raw: Option<&str>) -> Option<NaiveTime> {
  let caps = time_re().captures(raw?.trim())?;
  let hour = caps[1].parse().ok()?;
  let minute = caps[2].parse().ok()?;
  let second = match caps.get(3) {
    Some(m) => m.as_str().parse().ok()?,
    None => 0,
  };
  NaiveTime::from_hms_opt(hour, minute, second)
}

/// Parse a non-negative decimal price. Signs, exponents, thousands separators
/// and currency symbols all degrade to `None`.
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
  let s = raw?.trim();
  if !price_re().is_match(s) {
    return None;
  }
  s.parse::<f64>().ok().filter(|p| p.is_finite())
}

fn parse_coordinate(raw: Option<&str>, limit: f64) -> Option<f64> {
  let s = raw?.trim();
  if !coordinate_re().is_match(s) {
    return None;
  }
  s.parse::<f64>().ok().filter(|c| c.abs() <= limit)
}

// ─── StagedRecord ────────────────────────────────────────────────────────────

/// A typed, validated view of one raw record. Never persisted; always
/// recomputable from its [`RawRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
  pub raw_id:        i64,
  pub source:        String,
  pub source_id:     String,
  pub event_key:     EventKey,
  pub ingested_at:   DateTime<Utc>,
  /// Required downstream; a record without a name produces no fact.
  pub event_name:    Option<String>,
  pub event_date:    Option<NaiveDate>,
  pub event_time:    Option<NaiveTime>,
  pub venue_name:    Option<String>,
  pub venue_city:    Option<String>,
  pub venue_country: Option<String>,
  pub venue_lat:     Option<f64>,
  pub venue_lon:     Option<f64>,
  /// Never blank; defaults to [`DEFAULT_CATEGORY`].
  pub category:      String,
  /// Never blank; defaults to [`DEFAULT_SUBCATEGORY`].
  pub subcategory:   String,
  pub price_min:     Option<f64>,
  pub price_max:     Option<f64>,
  pub currency:      Option<String>,
  pub url:           Option<String>,
  pub status:        Option<String>,
}

impl StagedRecord {
  pub fn is_usable(&self) -> bool { self.event_name.is_some() }
}

/// Normalize one raw record.
pub fn normalize(raw: &RawRecord) -> StagedRecord {
  let f = &raw.fields;
  StagedRecord {
    raw_id:        raw.raw_id,
    source:        raw.source.trim().to_owned(),
    source_id:     raw.source_id.trim().to_owned(),
    event_key:     raw.event_key(),
    ingested_at:   raw.ingested_at,
    event_name:    proper_noun(f.event_name.as_deref()),
    event_date:    parse_date(f.event_date.as_deref()),
    event_time:    parse_time(f.event_time.as_deref()),
    venue_name:    proper_noun(f.venue_name.as_deref()),
    venue_city:    proper_noun(f.venue_city.as_deref()),
    venue_country: proper_noun(f.venue_country.as_deref()),
    venue_lat:     parse_coordinate(f.venue_lat.as_deref(), 90.0),
    venue_lon:     parse_coordinate(f.venue_lon.as_deref(), 180.0),
    category:      clean_text(f.category.as_deref())
      .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
    subcategory:   clean_text(f.subcategory.as_deref())
      .unwrap_or_else(|| DEFAULT_SUBCATEGORY.to_owned()),
    price_min:     parse_price(f.price_min.as_deref()),
    price_max:     parse_price(f.price_max.as_deref()),
    currency:      clean_text(f.currency.as_deref()).map(|c| c.to_uppercase()),
    url:           clean_text(f.url.as_deref()),
    status:        clean_text(f.status.as_deref()).map(|s| s.to_lowercase()),
  }
}
