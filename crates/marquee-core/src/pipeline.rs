//! Run orchestration over any [`WarehouseStore`].
//!
//! A full run takes an explicit snapshot of the unprocessed landing records
//! at start, and everything downstream is computed from that snapshot:
//!
//! 1. normalize every snapshot record;
//! 2. drop unusable records and collapse duplicates;
//! 3. resolve dimensions and upsert facts in one store transaction;
//! 4. flip the processed flag on snapshot records now present as facts;
//! 5. evaluate the quality gate and append its results.
//!
//! If any step fails the run is recorded as failed and no later step runs;
//! in particular the processed flags of the snapshot stay untouched unless
//! step 3 committed, so retrying reprocesses the same records safely.
//!
//! Every run is stamped on one clock: `started_at` is the business clock
//! `now`, and `finished_at` is `now` plus the wall time the run took.

use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  dimension::VenuePolicy,
  load::LoadContext,
  measures::RateTable,
  quality::{QualityCheckResult, QualityGate, QualityInput, QualityStatus},
  raw::NewRawRecord,
  reconciler,
  run::{RunKind, RunReport},
  staging::normalize,
  store::WarehouseStore,
};

/// Tunables for the load step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
  pub venue_policy: VenuePolicy,
  pub rates:        RateTable,
}

pub struct Pipeline<S> {
  store:  S,
  config: PipelineConfig,
  gate:   QualityGate,
}

impl<S: WarehouseStore> Pipeline<S> {
  /// A pipeline using the standard quality gate.
  pub fn new(store: S, config: PipelineConfig) -> Self {
    Self { store, config, gate: QualityGate::standard() }
  }

  pub fn with_gate(mut self, gate: QualityGate) -> Self {
    self.gate = gate;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &PipelineConfig { &self.config }

  // ── Landing run ───────────────────────────────────────────────────────

  pub async fn land(&self, records: Vec<NewRawRecord>) -> Result<RunReport, S::Error> {
    self.land_at(records, Utc::now()).await
  }

  /// Append `records` to the landing store as one logged run. Every record
  /// offered counts as fetched; those appended count as loaded.
  pub async fn land_at(
    &self,
    records: Vec<NewRawRecord>,
    now: DateTime<Utc>,
  ) -> Result<RunReport, S::Error> {
    let clock = Instant::now();
    let mut report = RunReport::start(RunKind::Land, now);
    report.records_fetched = records.len() as u64;
    self.store.start_run(&report).await?;

    match self.store.land(records, now).await {
      Ok(landed) => {
        report.records_loaded = landed.len() as u64;
        report.succeed(finished_at(now, clock));
        info!(
          run_id = %report.run_id,
          fetched = report.records_fetched,
          loaded = report.records_loaded,
          "landing run finished"
        );
      }
      Err(e) => {
        error!(run_id = %report.run_id, error = %e, "landing run failed");
        report.fail(finished_at(now, clock), e.to_string());
      }
    }

    self.store.finish_run(&report).await?;
    Ok(report)
  }

  // ── Full run ──────────────────────────────────────────────────────────

  pub async fn run_full(&self) -> Result<RunReport, S::Error> {
    self.run_full_at(Utc::now()).await
  }

  /// Full run with `now` as the business clock.
  ///
  /// Step failures do not surface as `Err`: they are recorded on the
  /// returned report with [`RunStatus::Failed`](crate::run::RunStatus).
  /// `Err` means the run log itself could not be written.
  pub async fn run_full_at(&self, now: DateTime<Utc>) -> Result<RunReport, S::Error> {
    let clock = Instant::now();
    let mut report = RunReport::start(RunKind::Full, now);
    self.store.start_run(&report).await?;
    info!(run_id = %report.run_id, "full run started");

    match self.full_steps(&mut report, now).await {
      Ok(()) => {
        report.succeed(finished_at(now, clock));
        info!(
          run_id = %report.run_id,
          fetched = report.records_fetched,
          loaded = report.records_loaded,
          skipped = report.records_skipped,
          processed = report.records_processed,
          quality = ?report.quality,
          "full run finished"
        );
      }
      Err(e) => {
        error!(run_id = %report.run_id, error = %e, "full run failed");
        report.fail(finished_at(now, clock), e.to_string());
      }
    }

    self.store.finish_run(&report).await?;
    Ok(report)
  }

  async fn full_steps(&self, report: &mut RunReport, now: DateTime<Utc>) -> Result<(), S::Error> {
    let snapshot = self.store.unprocessed().await?;
    report.records_fetched = snapshot.len() as u64;

    let batch = reconciler::prepare(snapshot.iter().map(normalize).collect());
    report.records_skipped = (batch.collapsed + batch.skipped_unnamed) as u64;
    if batch.skipped_unnamed > 0 {
      warn!(
        run_id = %report.run_id,
        skipped = batch.skipped_unnamed,
        "records without an event name were not loaded"
      );
    }

    let ctx = LoadContext::at(now, self.config.venue_policy, self.config.rates.clone());
    let outcome = self.store.load_batch(batch.records, ctx).await?;
    report.records_loaded = outcome.facts_loaded() as u64;
    info!(
      run_id = %report.run_id,
      inserted = outcome.facts_inserted,
      updated = outcome.facts_updated,
      venues_opened = outcome.venues_opened,
      venues_superseded = outcome.venues_superseded,
      "batch loaded"
    );

    let raw_ids = snapshot.iter().map(|r| r.raw_id).collect();
    report.records_processed = self.store.mark_processed(raw_ids).await?;

    let results = self.evaluate_quality(report.run_id, now).await?;
    report.quality = worst(&results);
    Ok(())
  }

  // ── Quality-only run ──────────────────────────────────────────────────

  pub async fn run_quality(&self) -> Result<RunReport, S::Error> {
    self.run_quality_at(Utc::now()).await
  }

  /// Evaluate the quality gate without touching landing or fact data.
  pub async fn run_quality_at(&self, now: DateTime<Utc>) -> Result<RunReport, S::Error> {
    let clock = Instant::now();
    let mut report = RunReport::start(RunKind::Quality, now);
    self.store.start_run(&report).await?;

    match self.evaluate_quality(report.run_id, now).await {
      Ok(results) => {
        report.quality = worst(&results);
        report.succeed(finished_at(now, clock));
        info!(run_id = %report.run_id, quality = ?report.quality, "quality run finished");
      }
      Err(e) => {
        error!(run_id = %report.run_id, error = %e, "quality run failed");
        report.fail(finished_at(now, clock), e.to_string());
      }
    }

    self.store.finish_run(&report).await?;
    Ok(report)
  }

  async fn evaluate_quality(
    &self,
    run_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Vec<QualityCheckResult>, S::Error> {
    let raw = self.store.raw_records().await?;
    let facts = self.store.facts().await?;
    let results = self.gate.evaluate(&QualityInput::new(&raw, &facts), run_id, now);

    for result in results.iter().filter(|r| r.status != QualityStatus::Passed) {
      warn!(
        %run_id,
        check = %result.check_name,
        status = %result.status,
        failed = result.records_failed,
        checked = result.records_checked,
        pass_rate = result.pass_rate,
        "quality check degraded"
      );
    }

    self.store.append_quality(results.clone()).await?;
    Ok(results)
  }
}

fn finished_at(now: DateTime<Utc>, clock: Instant) -> DateTime<Utc> {
  now + TimeDelta::from_std(clock.elapsed()).unwrap_or(TimeDelta::zero())
}

fn worst(results: &[QualityCheckResult]) -> Option<QualityStatus> {
  results.iter().map(|r| r.status).max()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn finished_at_follows_the_business_clock() {
    let now = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
    let finished = finished_at(now, Instant::now());
    assert!(finished >= now);
    assert!(finished - now < TimeDelta::minutes(1));
  }
}
