//! The event fact: one row per event natural key.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::EventKey;

/// Surrogate keys of the dimensions a fact points at. `None` marks a
/// dimension that could not be resolved; that is data, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRefs {
  pub date_id:     Option<i64>,
  pub venue_id:    Option<i64>,
  pub category_id: Option<i64>,
  pub source_id:   Option<i64>,
}

impl DimensionRefs {
  /// Whether every dimension the referential-completeness check cares about
  /// (date, venue, category) resolved.
  pub fn is_complete(&self) -> bool {
    self.date_id.is_some() && self.venue_id.is_some() && self.category_id.is_some()
  }
}

/// The measures and mutable attributes of a fact; exactly the columns an
/// upsert overwrites on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMeasures {
  pub status:           Option<String>,
  pub price_min:        Option<f64>,
  pub price_max:        Option<f64>,
  pub price_avg:        Option<f64>,
  pub currency:         Option<String>,
  /// `price_min` converted into the base currency.
  pub price_normalized: Option<f64>,
}

/// Input to a fact upsert, built by the reconciler from a staged record and
/// its resolved dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  pub event_key:  EventKey,
  pub source:     String,
  pub source_id:  String,
  pub refs:       DimensionRefs,
  pub event_name: String,
  pub event_date: Option<NaiveDate>,
  pub event_time: Option<NaiveTime>,
  pub url:        Option<String>,
  pub measures:   FactMeasures,
}

/// A persisted fact as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFact {
  pub fact_id:    i64,
  pub event_key:  EventKey,
  pub source:     String,
  pub source_id:  String,
  pub refs:       DimensionRefs,
  pub event_name: String,
  pub event_date: Option<NaiveDate>,
  pub event_time: Option<NaiveTime>,
  pub url:        Option<String>,
  pub measures:   FactMeasures,
  pub is_deleted: bool,
  /// Set on first insert; never changes.
  pub loaded_at:  DateTime<Utc>,
  /// Set on every merge.
  pub updated_at: DateTime<Utc>,
}

/// Whether an upsert created a fact or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  Inserted,
  Updated,
}
