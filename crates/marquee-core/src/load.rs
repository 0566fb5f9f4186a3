//! The write side of a run: resolving dimensions and merging facts for one
//! prepared batch.
//!
//! Everything here runs against a [`LoadTx`], a synchronous handle onto an
//! open write transaction. A backend opens the transaction, hands it to
//! [`load_batch`], and commits only if the whole batch succeeded, so a batch
//! lands completely or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  dimension::{CategoryRow, DateRow, SourceRow, VenueAttrs, VenuePolicy, VenueVersion},
  fact::{FactRow, UpsertOutcome},
  keys::VenueKey,
  measures::RateTable,
  reconciler, resolver,
  staging::StagedRecord,
};

// ─── Transaction handle ──────────────────────────────────────────────────────

/// Writes a backend must provide inside one transaction. Every `resolve_*`
/// method is get-or-create on the row's identity.
pub trait LoadTx {
  type Error;

  fn resolve_date(&mut self, row: &DateRow) -> Result<i64, Self::Error>;

  fn resolve_category(&mut self, row: &CategoryRow) -> Result<i64, Self::Error>;

  fn resolve_source(&mut self, row: &SourceRow) -> Result<i64, Self::Error>;

  /// The current version for `key`, if any.
  fn current_venue(&mut self, key: &VenueKey) -> Result<Option<VenueVersion>, Self::Error>;

  /// Mark a current version superseded as of `valid_to`.
  fn close_venue(&mut self, venue_id: i64, valid_to: NaiveDate) -> Result<(), Self::Error>;

  /// Insert a new current version. The backend must reject a second current
  /// version for the same key.
  fn open_venue(&mut self, attrs: &VenueAttrs, valid_from: NaiveDate) -> Result<i64, Self::Error>;

  /// Insert by event key, or overwrite the fact's measures and `updated_at`
  /// if the key already exists. Dimension references, identifiers and
  /// `loaded_at` of an existing fact are left untouched.
  fn upsert_fact(&mut self, row: &FactRow, now: DateTime<Utc>)
  -> Result<UpsertOutcome, Self::Error>;
}

// ─── Context and outcome ─────────────────────────────────────────────────────

/// Everything a load needs besides the records themselves. Passing the clock
/// in keeps a run deterministic given its input snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadContext {
  /// Business date used for venue `valid_from` / `valid_to`.
  pub today:        NaiveDate,
  /// Timestamp written to `loaded_at` / `updated_at`.
  pub now:          DateTime<Utc>,
  pub venue_policy: VenuePolicy,
  pub rates:        RateTable,
}

impl LoadContext {
  pub fn at(now: DateTime<Utc>, venue_policy: VenuePolicy, rates: RateTable) -> Self {
    Self { today: now.date_naive(), now, venue_policy, rates }
  }
}

/// Counts describing what one batch load did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
  pub dates_resolved:      usize,
  pub categories_resolved: usize,
  pub sources_resolved:    usize,
  pub venues_opened:       usize,
  pub venues_superseded:   usize,
  pub venues_reused:       usize,
  pub facts_inserted:      usize,
  pub facts_updated:       usize,
}

impl LoadOutcome {
  pub fn facts_loaded(&self) -> usize { self.facts_inserted + self.facts_updated }
}

/// Resolve every dimension the batch mentions, then upsert one fact per
/// record. `records` must already be prepared by
/// [`reconciler::prepare`]: deduplicated and usable.
pub fn load_batch<T: LoadTx>(
  tx: &mut T,
  records: &[StagedRecord],
  ctx: &LoadContext,
) -> Result<LoadOutcome, T::Error> {
  let mut outcome = LoadOutcome::default();
  let keys = resolver::resolve_dimensions(tx, records, ctx, &mut outcome)?;
  reconciler::merge_facts(tx, records, &keys, ctx, &mut outcome)?;
  Ok(outcome)
}
