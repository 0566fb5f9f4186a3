//! The `WarehouseStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `marquee-store-sqlite`). The [`Pipeline`](crate::pipeline::Pipeline) and
//! the CLI depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  dimension::VenueVersion,
  fact::EventFact,
  keys::{EventKey, VenueKey},
  load::{LoadContext, LoadOutcome},
  quality::QualityCheckResult,
  raw::{NewRawRecord, RawRecord},
  run::{RunReport, WarehouseSummary},
  staging::StagedRecord,
};

/// Abstraction over a warehouse backend: landing store, dimensions, facts,
/// quality history and run log.
///
/// Raw records and quality results are append-only. Facts are upserted by
/// natural key and never hard-deleted.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait WarehouseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Landing ───────────────────────────────────────────────────────────

  /// Append `records` to the landing store, stamped with `ingested_at`, and
  /// return them as landed.
  fn land(
    &self,
    records: Vec<NewRawRecord>,
    ingested_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;

  /// Snapshot of every raw record not yet processed, in landing order.
  fn unprocessed(&self) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;

  /// Every raw record, processed or not, in landing order.
  fn raw_records(&self) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + '_;

  /// Flip `processed` on those of `raw_ids` whose event key is present in the
  /// fact store. Returns how many flags changed. Never clears a flag.
  fn mark_processed(
    &self,
    raw_ids: Vec<i64>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Dimensions and facts ──────────────────────────────────────────────

  /// Resolve dimensions and upsert facts for a prepared batch in a single
  /// transaction: either everything commits or nothing does.
  fn load_batch(
    &self,
    records: Vec<StagedRecord>,
    ctx: LoadContext,
  ) -> impl Future<Output = Result<LoadOutcome, Self::Error>> + Send + '_;

  /// Every fact, deleted or not, in event-key order.
  fn facts(&self) -> impl Future<Output = Result<Vec<EventFact>, Self::Error>> + Send + '_;

  /// A single fact by natural key.
  fn fact<'a>(
    &'a self,
    key: &'a EventKey,
  ) -> impl Future<Output = Result<Option<EventFact>, Self::Error>> + Send + 'a;

  /// Set the soft-delete flag on a fact. Returns `false` if no such fact
  /// exists.
  fn soft_delete_fact<'a>(
    &'a self,
    key: &'a EventKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// All versions of one venue, oldest first.
  fn venue_history<'a>(
    &'a self,
    key: &'a VenueKey,
  ) -> impl Future<Output = Result<Vec<VenueVersion>, Self::Error>> + Send + 'a;

  // ── Quality history ───────────────────────────────────────────────────

  /// Append results to the quality history.
  fn append_quality(
    &self,
    results: Vec<QualityCheckResult>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Quality history, newest first, optionally limited.
  fn quality_history(
    &self,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<QualityCheckResult>, Self::Error>> + Send + '_;

  // ── Run log ───────────────────────────────────────────────────────────

  /// Record a run as started.
  fn start_run<'a>(
    &'a self,
    run: &'a RunReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Record a run's terminal state and counts.
  fn finish_run<'a>(
    &'a self,
    run: &'a RunReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Run log, newest first, optionally limited.
  fn runs(
    &self,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<RunReport>, Self::Error>> + Send + '_;

  /// Point-in-time warehouse counts.
  fn summary(&self) -> impl Future<Output = Result<WarehouseSummary, Self::Error>> + Send + '_;
}
