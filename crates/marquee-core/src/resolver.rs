//! Dimension resolution: staged attributes → surrogate keys.
//!
//! Each distinct value in the batch is looked up exactly once. Unresolvable
//! values (no date, no venue name) are simply absent from [`ResolvedKeys`]
//! and surface as `None` references on the fact.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::{
  dimension::{CategoryRow, DateRow, SourceRow, VenueAttrs, VenueTransition, transition},
  fact::DimensionRefs,
  keys::VenueKey,
  load::{LoadContext, LoadOutcome, LoadTx},
  staging::StagedRecord,
};

/// Surrogate keys for every distinct dimension value in a batch.
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
  dates:      BTreeMap<NaiveDate, i64>,
  categories: BTreeMap<CategoryRow, i64>,
  sources:    BTreeMap<String, i64>,
  venues:     BTreeMap<VenueKey, i64>,
}

impl ResolvedKeys {
  pub fn refs_for(&self, record: &StagedRecord) -> DimensionRefs {
    DimensionRefs {
      date_id:     record.event_date.and_then(|d| self.dates.get(&d).copied()),
      venue_id:    venue_attrs(record)
        .and_then(|a| self.venues.get(&a.key()).copied()),
      category_id: self.categories.get(&category_row(record)).copied(),
      source_id:   self.sources.get(&record.source).copied(),
    }
  }
}

/// The venue attributes a staged record carries, or `None` when it names no
/// venue.
pub fn venue_attrs(record: &StagedRecord) -> Option<VenueAttrs> {
  Some(VenueAttrs {
    name:    record.venue_name.clone()?,
    city:    record.venue_city.clone(),
    country: record.venue_country.clone(),
    lat:     record.venue_lat,
    lon:     record.venue_lon,
  })
}

fn category_row(record: &StagedRecord) -> CategoryRow {
  CategoryRow {
    category:    record.category.clone(),
    subcategory: record.subcategory.clone(),
  }
}

/// Resolve all four dimensions for `records`.
pub fn resolve_dimensions<T: LoadTx>(
  tx: &mut T,
  records: &[StagedRecord],
  ctx: &LoadContext,
  outcome: &mut LoadOutcome,
) -> Result<ResolvedKeys, T::Error> {
  let mut keys = ResolvedKeys::default();

  let dates: BTreeSet<NaiveDate> = records.iter().filter_map(|r| r.event_date).collect();
  for date in dates {
    let id = tx.resolve_date(&DateRow::from_date(date))?;
    keys.dates.insert(date, id);
  }

  let categories: BTreeSet<CategoryRow> = records.iter().map(category_row).collect();
  for row in categories {
    let id = tx.resolve_category(&row)?;
    keys.categories.insert(row, id);
  }

  let sources: BTreeSet<&str> = records.iter().map(|r| r.source.as_str()).collect();
  for name in sources {
    let id = tx.resolve_source(&SourceRow::new(name))?;
    keys.sources.insert(name.to_owned(), id);
  }

  for (key, attrs) in latest_venue_attrs(records) {
    let current = tx.current_venue(&key)?;
    // A sparse sighting keeps what the current version already knows.
    let attrs = match &current {
      Some(version) => attrs.merged_over(&version.attrs),
      None => attrs,
    };
    let id = match transition(current.as_ref(), &attrs, ctx.venue_policy) {
      VenueTransition::Open => {
        outcome.venues_opened += 1;
        tx.open_venue(&attrs, ctx.today)?
      }
      VenueTransition::Reuse { venue_id } => {
        outcome.venues_reused += 1;
        venue_id
      }
      VenueTransition::Supersede { closing } => {
        outcome.venues_superseded += 1;
        tx.close_venue(closing, ctx.today)?;
        tx.open_venue(&attrs, ctx.today)?
      }
    };
    keys.venues.insert(key, id);
  }

  outcome.dates_resolved = keys.dates.len();
  outcome.categories_resolved = keys.categories.len();
  outcome.sources_resolved = keys.sources.len();
  Ok(keys)
}

/// One set of attributes per venue key, merged field by field across the
/// records naming it. The most recently ingested non-blank value wins.
fn latest_venue_attrs(records: &[StagedRecord]) -> BTreeMap<VenueKey, VenueAttrs> {
  let mut ordered: Vec<&StagedRecord> = records.iter().collect();
  ordered.sort_by_key(|r| (r.ingested_at, r.raw_id));

  let mut latest: BTreeMap<VenueKey, VenueAttrs> = BTreeMap::new();
  for attrs in ordered.into_iter().filter_map(venue_attrs) {
    let key = attrs.key();
    let merged = match latest.get(&key) {
      Some(previous) => attrs.merged_over(previous),
      None => attrs,
    };
    latest.insert(key, merged);
  }
  latest
}
