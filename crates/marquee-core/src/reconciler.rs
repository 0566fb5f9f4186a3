//! Fact reconciliation: collapse a staged batch to one record per event key,
//! derive measures, and merge into the fact store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  fact::{FactMeasures, FactRow, UpsertOutcome},
  keys::EventKey,
  load::{LoadContext, LoadOutcome, LoadTx},
  measures::{RateTable, price_avg},
  resolver::ResolvedKeys,
  staging::StagedRecord,
};

/// A staged batch ready for loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedBatch {
  /// One usable record per event key, in event-key order.
  pub records:         Vec<StagedRecord>,
  /// Usable records dropped because a newer one shared their event key.
  pub collapsed:       usize,
  /// Records dropped for lacking an event name.
  pub skipped_unnamed: usize,
}

/// Drop unusable records, then keep the most recently ingested record per
/// event key. Ties on ingestion time go to the later landing id.
pub fn prepare(staged: Vec<StagedRecord>) -> PreparedBatch {
  let total = staged.len();
  let mut newest: BTreeMap<EventKey, StagedRecord> = BTreeMap::new();
  let mut usable = 0;

  for record in staged.into_iter().filter(StagedRecord::is_usable) {
    usable += 1;
    match newest.get(&record.event_key) {
      Some(kept) if (kept.ingested_at, kept.raw_id) >= (record.ingested_at, record.raw_id) => {}
      _ => {
        newest.insert(record.event_key.clone(), record);
      }
    }
  }

  let records: Vec<StagedRecord> = newest.into_values().collect();
  PreparedBatch {
    collapsed: usable - records.len(),
    skipped_unnamed: total - usable,
    records,
  }
}

/// Derive the measures for one record.
pub fn measures(record: &StagedRecord, rates: &RateTable) -> FactMeasures {
  FactMeasures {
    status:           record.status.clone(),
    price_min:        record.price_min,
    price_max:        record.price_max,
    price_avg:        price_avg(record.price_min, record.price_max),
    currency:         record.currency.clone(),
    price_normalized: rates.normalize(record.price_min, record.currency.as_deref()),
  }
}

/// Build the upsert row for `record`, or `None` if it has no event name.
pub fn fact_row(record: &StagedRecord, keys: &ResolvedKeys, rates: &RateTable) -> Option<FactRow> {
  Some(FactRow {
    event_key:  record.event_key.clone(),
    source:     record.source.clone(),
    source_id:  record.source_id.clone(),
    refs:       keys.refs_for(record),
    event_name: record.event_name.clone()?,
    event_date: record.event_date,
    event_time: record.event_time,
    url:        record.url.clone(),
    measures:   measures(record, rates),
  })
}

/// Upsert one fact per record.
pub fn merge_facts<T: LoadTx>(
  tx: &mut T,
  records: &[StagedRecord],
  keys: &ResolvedKeys,
  ctx: &LoadContext,
  outcome: &mut LoadOutcome,
) -> Result<(), T::Error> {
  for row in records.iter().filter_map(|r| fact_row(r, keys, &ctx.rates)) {
    match tx.upsert_fact(&row, ctx.now)? {
      UpsertOutcome::Inserted => outcome.facts_inserted += 1,
      UpsertOutcome::Updated => outcome.facts_updated += 1,
    }
  }
  Ok(())
}
