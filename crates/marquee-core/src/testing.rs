//! In-memory [`LoadTx`] and fixtures for unit tests.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{
  dimension::{CategoryRow, DateRow, SourceRow, VenueAttrs, VenueVersion},
  fact::{FactRow, UpsertOutcome},
  keys::{EventKey, VenueKey},
  load::LoadTx,
  staging::StagedRecord,
};

#[derive(Debug, Default)]
pub struct MemoryTx {
  pub dates:         BTreeMap<NaiveDate, i64>,
  pub categories:    BTreeMap<CategoryRow, i64>,
  pub sources:       BTreeMap<String, i64>,
  pub venues:        Vec<VenueVersion>,
  /// Fact row plus `(loaded_at, updated_at)`.
  pub facts:         BTreeMap<EventKey, (FactRow, DateTime<Utc>, DateTime<Utc>)>,
  pub resolve_calls: usize,
  next_id:           i64,
}

impl MemoryTx {
  fn next_id(&mut self) -> i64 {
    self.next_id += 1;
    self.next_id
  }

  fn get_or_insert<K: Ord>(map: &mut BTreeMap<K, i64>, key: K, fresh: i64) -> i64 {
    *map.entry(key).or_insert(fresh)
  }
}

impl LoadTx for MemoryTx {
  type Error = String;

  fn resolve_date(&mut self, row: &DateRow) -> Result<i64, String> {
    self.resolve_calls += 1;
    let id = self.next_id();
    Ok(Self::get_or_insert(&mut self.dates, row.date, id))
  }

  fn resolve_category(&mut self, row: &CategoryRow) -> Result<i64, String> {
    self.resolve_calls += 1;
    let id = self.next_id();
    Ok(Self::get_or_insert(&mut self.categories, row.clone(), id))
  }

  fn resolve_source(&mut self, row: &SourceRow) -> Result<i64, String> {
    self.resolve_calls += 1;
    let id = self.next_id();
    Ok(Self::get_or_insert(&mut self.sources, row.name.clone(), id))
  }

  fn current_venue(&mut self, key: &VenueKey) -> Result<Option<VenueVersion>, String> {
    Ok(self.venues.iter().find(|v| &v.venue_key == key && v.is_current).cloned())
  }

  fn close_venue(&mut self, venue_id: i64, valid_to: NaiveDate) -> Result<(), String> {
    let version = self
      .venues
      .iter_mut()
      .find(|v| v.venue_id == venue_id && v.is_current)
      .ok_or_else(|| format!("no current venue {venue_id}"))?;
    version.is_current = false;
    version.valid_to = Some(valid_to);
    Ok(())
  }

  fn open_venue(&mut self, attrs: &VenueAttrs, valid_from: NaiveDate) -> Result<i64, String> {
    let key = attrs.key();
    if self.venues.iter().any(|v| v.venue_key == key && v.is_current) {
      return Err(format!("venue {key} already has a current version"));
    }
    let venue_id = self.next_id();
    self.venues.push(VenueVersion {
      venue_id,
      venue_key: key,
      attrs: attrs.clone(),
      valid_from,
      valid_to: None,
      is_current: true,
    });
    Ok(venue_id)
  }

  fn upsert_fact(&mut self, row: &FactRow, now: DateTime<Utc>) -> Result<UpsertOutcome, String> {
    match self.facts.get_mut(&row.event_key) {
      Some((existing, _, updated_at)) => {
        existing.measures = row.measures.clone();
        *updated_at = now;
        Ok(UpsertOutcome::Updated)
      }
      None => {
        self.facts.insert(row.event_key.clone(), (row.clone(), now, now));
        Ok(UpsertOutcome::Inserted)
      }
    }
  }
}

/// A clean, fully-populated staged record.
pub fn staged(source: &str, source_id: &str) -> StagedRecord {
  StagedRecord {
    raw_id:        source_id.parse().unwrap_or(0),
    source:        source.into(),
    source_id:     source_id.into(),
    event_key:     EventKey::derive(source, source_id),
    ingested_at:   Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap(),
    event_name:    Some("Jazz Night".into()),
    event_date:    NaiveDate::from_ymd_opt(2026, 11, 3),
    event_time:    NaiveTime::from_hms_opt(20, 0, 0),
    venue_name:    Some("Festhalle".into()),
    venue_city:    Some("Frankfurt".into()),
    venue_country: Some("Germany".into()),
    venue_lat:     Some(50.1109),
    venue_lon:     Some(8.6569),
    category:      "Music".into(),
    subcategory:   "General".into(),
    price_min:     Some(10.0),
    price_max:     Some(20.0),
    currency:      Some("EUR".into()),
    url:           Some("https://example.com/event/1".into()),
    status:        Some("onsale".into()),
  }
}
