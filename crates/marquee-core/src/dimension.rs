//! Dimension rows and the venue versioning state machine.
//!
//! Date, category and source dimensions are plain get-or-create lookups. The
//! venue dimension is versioned (SCD type 2): each natural key owns a chain
//! of versions of which at most one is current. Moving along that chain is
//! decided by [`transition`], a pure function; storage backends only apply
//! its verdict.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::keys::VenueKey;

// ─── Date ────────────────────────────────────────────────────────────────────

/// A calendar date and the attributes derived purely from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRow {
  pub date:        NaiveDate,
  /// ISO weekday number, Monday = 1.
  pub day_of_week: u32,
  pub day_name:    String,
  /// ISO 8601 week number.
  pub week:        u32,
  pub month:       u32,
  pub month_name:  String,
  pub quarter:     u32,
  pub year:        i32,
  pub is_weekend:  bool,
}

impl DateRow {
  pub fn from_date(date: NaiveDate) -> Self {
    let weekday = date.weekday();
    Self {
      date,
      day_of_week: weekday.number_from_monday(),
      day_name: date.format("%A").to_string(),
      week: date.iso_week().week(),
      month: date.month(),
      month_name: date.format("%B").to_string(),
      quarter: (date.month() - 1) / 3 + 1,
      year: date.year(),
      is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
    }
  }
}

// ─── Category ────────────────────────────────────────────────────────────────

/// Identity of the category dimension.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryRow {
  pub category:    String,
  pub subcategory: String,
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// How a source system delivers its data.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
  Api,
  File,
  Manual,
  Unknown,
}

impl SourceType {
  /// The fixed source-name → type mapping. Unrecognised sources are
  /// [`SourceType::Unknown`].
  pub fn for_source(name: &str) -> Self {
    match name.trim().to_lowercase().as_str() {
      "ticketmaster" | "eventbrite" => Self::Api,
      "csv" => Self::File,
      "manual" => Self::Manual,
      _ => Self::Unknown,
    }
  }
}

/// Identity (name) and classification of the source dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
  pub name:        String,
  pub source_type: SourceType,
}

impl SourceRow {
  pub fn new(name: &str) -> Self {
    Self { name: name.to_owned(), source_type: SourceType::for_source(name) }
  }
}

// ─── Venue ───────────────────────────────────────────────────────────────────

/// The attributes of one venue version. `name` and `city` form the identity;
/// the rest may change over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueAttrs {
  pub name:    String,
  pub city:    Option<String>,
  pub country: Option<String>,
  pub lat:     Option<f64>,
  pub lon:     Option<f64>,
}

impl VenueAttrs {
  pub fn key(&self) -> VenueKey { VenueKey::derive(&self.name, self.city.as_deref()) }

  /// These attributes with every blank filled from `base`. Values present
  /// here win; identity is taken from `self`.
  pub fn merged_over(&self, base: &VenueAttrs) -> VenueAttrs {
    VenueAttrs {
      name:    self.name.clone(),
      city:    self.city.clone(),
      country: self.country.clone().or_else(|| base.country.clone()),
      lat:     self.lat.or(base.lat),
      lon:     self.lon.or(base.lon),
    }
  }

  /// Whether `incoming` carries information that contradicts or extends this
  /// version. An attribute absent from `incoming` is treated as unknown, not
  /// as a change.
  pub fn differs_from(&self, incoming: &VenueAttrs, tolerance: f64) -> bool {
    let coordinate_changed = |current: Option<f64>, new: Option<f64>| match (current, new) {
      (Some(a), Some(b)) => (a - b).abs() > tolerance,
      (None, Some(_)) => true,
      (_, None) => false,
    };
    let country_changed = match (&self.country, &incoming.country) {
      (Some(a), Some(b)) => a != b,
      (None, Some(_)) => true,
      (_, None) => false,
    };
    country_changed
      || coordinate_changed(self.lat, incoming.lat)
      || coordinate_changed(self.lon, incoming.lon)
  }
}

/// One row of the venue dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueVersion {
  pub venue_id:   i64,
  pub venue_key:  VenueKey,
  pub attrs:      VenueAttrs,
  pub valid_from: NaiveDate,
  pub valid_to:   Option<NaiveDate>,
  pub is_current: bool,
}

/// What to do when a venue that already has a current version is seen again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum VenuePolicy {
  /// Keep the first version forever; later attribute changes are ignored.
  InsertOnce,
  /// Close the current version and open a new one when country or
  /// coordinates change. Coordinates within `tolerance` degrees are equal.
  Revise { tolerance: f64 },
}

pub const DEFAULT_COORDINATE_TOLERANCE: f64 = 1e-6;

impl Default for VenuePolicy {
  fn default() -> Self { Self::Revise { tolerance: DEFAULT_COORDINATE_TOLERANCE } }
}

/// The verdict of [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueTransition {
  /// No current version exists: open the first one.
  Open,
  /// The current version still describes the venue.
  Reuse { venue_id: i64 },
  /// Close `closing` (valid until today) and open a new current version.
  Supersede { closing: i64 },
}

/// Decide how the venue chain for one natural key moves given the `incoming`
/// attributes.
pub fn transition(
  current: Option<&VenueVersion>,
  incoming: &VenueAttrs,
  policy: VenuePolicy,
) -> VenueTransition {
  let Some(current) = current else {
    return VenueTransition::Open;
  };
  match policy {
    VenuePolicy::InsertOnce => VenueTransition::Reuse { venue_id: current.venue_id },
    VenuePolicy::Revise { tolerance } => {
      if current.attrs.differs_from(incoming, tolerance) {
        VenueTransition::Supersede { closing: current.venue_id }
      } else {
        VenueTransition::Reuse { venue_id: current.venue_id }
      }
    }
  }
}
