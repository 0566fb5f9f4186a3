//! Landing records: the raw, unparsed input to the warehouse.
//!
//! A raw record is written once by the landing collaborator and never
//! deleted. The only mutation the engine ever performs is flipping
//! `processed` from `false` to `true` once the record's fact has been
//! committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::keys::EventKey;

// ─── Unparsed fields ─────────────────────────────────────────────────────────

/// The source-provided, unparsed attributes of an event. Every field is kept
/// exactly as it arrived; validation happens in [`crate::staging`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFields {
  #[serde(deserialize_with = "lenient_text")]
  pub event_name:    Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub event_date:    Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub event_time:    Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub venue_name:    Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub venue_city:    Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub venue_country: Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub venue_lat:     Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub venue_lon:     Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub category:      Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub subcategory:   Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub price_min:     Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub price_max:     Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub currency:      Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub url:           Option<String>,
  #[serde(deserialize_with = "lenient_text")]
  pub status:        Option<String>,
}

/// Accepts strings, numbers and booleans alike: sources disagree on whether a
/// price or a coordinate is quoted.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match serde_json::Value::deserialize(deserializer)? {
    serde_json::Value::Null => None,
    serde_json::Value::String(s) => Some(s),
    other => Some(other.to_string()),
  })
}

// ─── RawRecord ───────────────────────────────────────────────────────────────

/// A landed record as read back from the landing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
  /// Store-assigned, monotonically increasing landing id.
  pub raw_id:      i64,
  /// Source system name, e.g. `"ticketmaster"` or `"csv"`.
  pub source:      String,
  /// The event's identifier within its source system.
  pub source_id:   String,
  /// The full upstream document, if the source provided one.
  pub payload:     Option<serde_json::Value>,
  pub fields:      RawFields,
  pub ingested_at: DateTime<Utc>,
  pub processed:   bool,
}

impl RawRecord {
  /// The event natural key this record reconciles into.
  pub fn event_key(&self) -> EventKey {
    EventKey::derive(&self.source, &self.source_id)
  }
}

// ─── NewRawRecord ────────────────────────────────────────────────────────────

/// Input to [`crate::store::WarehouseStore::land`]. The landing id,
/// ingestion timestamp and processed flag are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRawRecord {
  pub source:    String,
  pub source_id: String,
  #[serde(default)]
  pub payload:   Option<serde_json::Value>,
  #[serde(flatten)]
  pub fields:    RawFields,
}

impl NewRawRecord {
  /// Convenience constructor with every unparsed field absent.
  pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
    Self {
      source:    source.into(),
      source_id: source_id.into(),
      payload:   None,
      fields:    RawFields::default(),
    }
  }
}
