//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use marquee_core::{
  dimension::{VenuePolicy, DEFAULT_COORDINATE_TOLERANCE},
  keys::{EventKey, VenueKey},
  pipeline::{Pipeline, PipelineConfig},
  quality::{
    CheckOutcome, ClassificationPolicy, QualityCheck, QualityGate, QualityInput, QualityStatus,
  },
  raw::NewRawRecord,
  run::{RunKind, RunStatus},
  store::WarehouseStore,
};
use serde_json::json;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

/// A clean landing record for the Festhalle in Frankfurt.
fn event(source: &str, source_id: &str) -> NewRawRecord {
  let mut r = NewRawRecord::new(source, source_id);
  r.fields.event_name = Some("  jazz night ".into());
  r.fields.event_date = Some("2026-11-03".into());
  r.fields.event_time = Some("20:00".into());
  r.fields.venue_name = Some("festhalle".into());
  r.fields.venue_city = Some("frankfurt".into());
  r.fields.venue_country = Some("Germany".into());
  r.fields.venue_lat = Some("50.1109".into());
  r.fields.venue_lon = Some("8.6569".into());
  r.fields.category = Some("music".into());
  r.fields.price_min = Some("10".into());
  r.fields.price_max = Some("20".into());
  r.fields.currency = Some("usd".into());
  r.fields.status = Some("OnSale".into());
  r
}

fn pipeline(s: &SqliteStore) -> Pipeline<SqliteStore> {
  Pipeline::new(s.clone(), PipelineConfig::default())
}

fn pipeline_with(s: &SqliteStore, venue_policy: VenuePolicy) -> Pipeline<SqliteStore> {
  Pipeline::new(s.clone(), PipelineConfig { venue_policy, ..Default::default() })
}

async fn count(s: &SqliteStore, table: &'static str) -> i64 {
  s.conn
    .call(move |conn| {
      Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
    })
    .await
    .unwrap()
}

// ─── Landing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn land_appends_unprocessed_records() {
  let s = store().await;

  let landed = s
    .land(vec![event("csv", "1"), event("csv", "2")], at(1, 6))
    .await
    .unwrap();
  assert_eq!(landed.len(), 2);
  assert!(landed[0].raw_id < landed[1].raw_id);
  assert!(landed.iter().all(|r| !r.processed && r.ingested_at == at(1, 6)));

  // Landing the same source record again appends; it never overwrites.
  s.land(vec![event("csv", "1")], at(2, 6)).await.unwrap();
  let unprocessed = s.unprocessed().await.unwrap();
  assert_eq!(unprocessed.len(), 3);
  assert_eq!(unprocessed[0].fields.event_name.as_deref(), Some("  jazz night "));
}

#[tokio::test]
async fn land_preserves_source_payload() {
  let s = store().await;
  let mut r = event("ticketmaster", "G5vYZ9");
  r.payload = Some(json!({ "id": "G5vYZ9", "dates": { "status": { "code": "onsale" } } }));

  s.land(vec![r], at(1, 6)).await.unwrap();
  let raw = s.raw_records().await.unwrap();
  assert_eq!(raw[0].payload.as_ref().unwrap()["dates"]["status"]["code"], "onsale");
}

// ─── Full runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_loads_facts_and_marks_records_processed() {
  let s = store().await;
  s.land(vec![event("csv", "1"), event("ticketmaster", "1")], at(1, 6))
    .await
    .unwrap();

  let report = pipeline(&s).run_full_at(at(1, 7)).await.unwrap();
  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(report.records_fetched, 2);
  assert_eq!(report.records_loaded, 2);
  assert_eq!(report.records_processed, 2);
  assert_eq!(report.quality, Some(QualityStatus::Passed));

  assert!(s.unprocessed().await.unwrap().is_empty());

  let fact = s.fact(&EventKey::derive("csv", "1")).await.unwrap().unwrap();
  assert_eq!(fact.event_name, "Jazz Night");
  assert_eq!(fact.event_date, NaiveDate::from_ymd_opt(2026, 11, 3));
  assert_eq!(fact.measures.currency.as_deref(), Some("USD"));
  assert_eq!(fact.measures.status.as_deref(), Some("onsale"));
  assert_eq!(fact.measures.price_avg, Some(15.0));
  assert_eq!(fact.measures.price_normalized, Some(9.2));
  assert!(fact.refs.is_complete());
  assert!(fact.refs.source_id.is_some());

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.facts, 2);
  assert_eq!(summary.venues, 1);
  assert_eq!(summary.current_venues, 1);
  assert_eq!(summary.dates, 1);
  assert_eq!(summary.categories, 1);
  assert_eq!(summary.sources, 2);
  assert_eq!(summary.unprocessed_records, 0);
}

#[tokio::test]
async fn rerunning_the_same_input_changes_nothing_but_updated_at() {
  let s = store().await;
  let p = pipeline(&s);

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();
  let first = s.facts().await.unwrap();

  // Nothing new landed: the second run fetches nothing.
  let idle = p.run_full_at(at(1, 8)).await.unwrap();
  assert_eq!(idle.records_fetched, 0);
  assert_eq!(idle.records_loaded, 0);

  // The same record landed again reconciles onto the same fact.
  s.land(vec![event("csv", "1")], at(2, 6)).await.unwrap();
  let again = p.run_full_at(at(2, 7)).await.unwrap();
  assert_eq!(again.records_loaded, 1);

  let second = s.facts().await.unwrap();
  assert_eq!(second.len(), 1);
  assert_eq!(second[0].fact_id, first[0].fact_id);
  assert_eq!(second[0].refs, first[0].refs);
  assert_eq!(second[0].measures, first[0].measures);
  assert_eq!(second[0].loaded_at, first[0].loaded_at);
  assert!(second[0].updated_at > first[0].updated_at);

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.venues, 1);
  assert_eq!(summary.dates, 1);
}

#[tokio::test]
async fn duplicates_within_a_batch_keep_the_newest_landing() {
  let s = store().await;
  let mut older = event("csv", "7");
  older.fields.price_min = Some("10".into());
  older.fields.price_max = Some("20".into());
  let mut newer = event("csv", "7");
  newer.fields.price_min = Some("30".into());
  newer.fields.price_max = Some("40".into());

  s.land(vec![older], at(1, 6)).await.unwrap();
  s.land(vec![newer], at(1, 9)).await.unwrap();

  let report = pipeline(&s).run_full_at(at(1, 10)).await.unwrap();
  assert_eq!(report.records_fetched, 2);
  assert_eq!(report.records_loaded, 1);
  assert_eq!(report.records_skipped, 1);
  // Both landings share the event key, so both are now processed.
  assert_eq!(report.records_processed, 2);

  let fact = s.fact(&EventKey::derive("csv", "7")).await.unwrap().unwrap();
  assert_eq!(fact.measures.price_min, Some(30.0));
  assert_eq!(fact.measures.price_max, Some(40.0));
}

#[tokio::test]
async fn merge_updates_measures_but_keeps_descriptive_columns() {
  let s = store().await;
  let p = pipeline(&s);

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();
  let before = s.fact(&EventKey::derive("csv", "1")).await.unwrap().unwrap();

  let mut changed = event("csv", "1");
  changed.fields.event_name = Some("Renamed Night".into());
  changed.fields.event_date = Some("2026-12-24".into());
  changed.fields.status = Some("cancelled".into());
  changed.fields.price_max = Some("25".into());
  s.land(vec![changed], at(2, 6)).await.unwrap();
  p.run_full_at(at(2, 7)).await.unwrap();

  let after = s.fact(&EventKey::derive("csv", "1")).await.unwrap().unwrap();
  assert_eq!(after.event_name, before.event_name);
  assert_eq!(after.refs, before.refs);
  assert_eq!(after.measures.status.as_deref(), Some("cancelled"));
  assert_eq!(after.measures.price_max, Some(25.0));
  assert_eq!(after.measures.price_avg, Some(17.5));
}

#[tokio::test]
async fn unnamed_records_stay_unprocessed() {
  let s = store().await;
  let mut unnamed = event("csv", "2");
  unnamed.fields.event_name = Some("   ".into());
  s.land(vec![event("csv", "1"), unnamed], at(1, 6)).await.unwrap();

  let report = pipeline(&s).run_full_at(at(1, 7)).await.unwrap();
  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(report.records_loaded, 1);
  assert_eq!(report.records_skipped, 1);
  assert_eq!(report.records_processed, 1);

  let left = s.unprocessed().await.unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].source_id, "2");
}

#[tokio::test]
async fn failed_load_rolls_back_and_leaves_snapshot_unprocessed() {
  let s = store().await;
  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE fact_events")?;
      Ok(())
    })
    .await
    .unwrap();

  let report = pipeline(&s).run_full_at(at(1, 7)).await.unwrap();
  assert_eq!(report.status, RunStatus::Failed);
  assert!(report.error_message.is_some());
  assert_eq!(report.records_processed, 0);

  assert_eq!(s.unprocessed().await.unwrap().len(), 1);
  // Dimension rows written before the failing fact upsert were rolled back.
  assert_eq!(count(&s, "dim_date").await, 0);
  assert_eq!(count(&s, "dim_venue").await, 0);

  let runs = s.runs(None).await.unwrap();
  assert_eq!(runs[0].run_id, report.run_id);
  assert_eq!(runs[0].status, RunStatus::Failed);
  assert!(runs[0].finished_at.is_some());
}

// ─── Venue versioning ────────────────────────────────────────────────────────

#[tokio::test]
async fn revise_policy_supersedes_a_moved_venue() {
  let s = store().await;
  let p = pipeline(&s);

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();

  let mut moved = event("csv", "2");
  moved.fields.venue_lat = Some("50.2000".into());
  s.land(vec![moved], at(5, 6)).await.unwrap();
  p.run_full_at(at(5, 7)).await.unwrap();

  let key = VenueKey::derive("Festhalle", Some("Frankfurt"));
  let history = s.venue_history(&key).await.unwrap();
  assert_eq!(history.len(), 2);
  assert!(!history[0].is_current);
  assert_eq!(history[0].valid_to, NaiveDate::from_ymd_opt(2026, 10, 5));
  assert!(history[1].is_current);
  assert_eq!(history[1].valid_from, NaiveDate::from_ymd_opt(2026, 10, 5).unwrap());
  assert_eq!(history[1].attrs.lat, Some(50.2));

  // Each fact keeps the version that was current when it was loaded.
  let old = s.fact(&EventKey::derive("csv", "1")).await.unwrap().unwrap();
  let new = s.fact(&EventKey::derive("csv", "2")).await.unwrap().unwrap();
  assert_eq!(old.refs.venue_id, Some(history[0].venue_id));
  assert_eq!(new.refs.venue_id, Some(history[1].venue_id));
}

#[tokio::test]
async fn revise_policy_ignores_coordinate_jitter() {
  let s = store().await;
  let p = pipeline_with(&s, VenuePolicy::Revise { tolerance: DEFAULT_COORDINATE_TOLERANCE });

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();

  let mut jitter = event("csv", "2");
  jitter.fields.venue_lat = Some("50.11090001".into());
  jitter.fields.venue_country = None;
  s.land(vec![jitter], at(2, 6)).await.unwrap();
  p.run_full_at(at(2, 7)).await.unwrap();

  let key = VenueKey::derive("Festhalle", Some("Frankfurt"));
  assert_eq!(s.venue_history(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn insert_once_policy_keeps_the_first_version() {
  let s = store().await;
  let p = pipeline_with(&s, VenuePolicy::InsertOnce);

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();

  let mut moved = event("csv", "2");
  moved.fields.venue_country = Some("Austria".into());
  s.land(vec![moved], at(2, 6)).await.unwrap();
  p.run_full_at(at(2, 7)).await.unwrap();

  let key = VenueKey::derive("Festhalle", Some("Frankfurt"));
  let history = s.venue_history(&key).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].attrs.country.as_deref(), Some("Germany"));
  assert!(history[0].is_current);
}

/// The Festhalle renamed to "Deutschland" with its coordinates left blank.
fn renamed_without_coordinates(source_id: &str) -> NewRawRecord {
  let mut r = event("csv", source_id);
  r.fields.venue_country = Some("Deutschland".into());
  r.fields.venue_lat = None;
  r.fields.venue_lon = None;
  r
}

#[tokio::test]
async fn sparse_revision_carries_known_coordinates_forward() {
  let s = store().await;
  let p = pipeline(&s);

  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  p.run_full_at(at(1, 7)).await.unwrap();

  s.land(vec![renamed_without_coordinates("2")], at(2, 6)).await.unwrap();
  p.run_full_at(at(2, 7)).await.unwrap();

  let mut restated = event("csv", "3");
  restated.fields.venue_country = Some("Deutschland".into());
  s.land(vec![restated], at(3, 6)).await.unwrap();
  p.run_full_at(at(3, 7)).await.unwrap();

  let key = VenueKey::derive("Festhalle", Some("Frankfurt"));
  let history = s.venue_history(&key).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[1].attrs.country.as_deref(), Some("Deutschland"));
  assert_eq!(history[1].attrs.lat, Some(50.1109));
  assert_eq!(history[1].attrs.lon, Some(8.6569));
  assert!(history[1].is_current);
}

#[tokio::test]
async fn sparse_landing_in_the_same_batch_keeps_coordinates() {
  let s = store().await;
  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  s.land(vec![renamed_without_coordinates("2")], at(1, 7)).await.unwrap();
  pipeline(&s).run_full_at(at(1, 8)).await.unwrap();

  let key = VenueKey::derive("Festhalle", Some("Frankfurt"));
  let history = s.venue_history(&key).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].attrs.country.as_deref(), Some("Deutschland"));
  assert_eq!(history[0].attrs.lat, Some(50.1109));
  assert_eq!(history[0].attrs.lon, Some(8.6569));
}

#[tokio::test]
async fn schema_rejects_two_current_versions_of_a_venue() {
  let s = store().await;
  let result = s
    .conn
    .call(|conn| {
      for _ in 0..2 {
        conn.execute(
          "INSERT INTO dim_venue (venue_key, name, valid_from, is_current)
           VALUES ('k', 'Festhalle', '2026-10-01', 1)",
          [],
        )?;
      }
      Ok(())
    })
    .await;
  assert!(result.is_err());
}

// ─── Facts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_delete_flags_without_removing() {
  let s = store().await;
  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  pipeline(&s).run_full_at(at(1, 7)).await.unwrap();

  let key = EventKey::derive("csv", "1");
  assert!(s.soft_delete_fact(&key).await.unwrap());
  assert!(!s.soft_delete_fact(&EventKey::derive("csv", "missing")).await.unwrap());

  let fact = s.fact(&key).await.unwrap().unwrap();
  assert!(fact.is_deleted);

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.facts, 1);
  assert_eq!(summary.deleted_facts, 1);
}

// ─── Quality history and run log ─────────────────────────────────────────────

#[tokio::test]
async fn quality_runs_append_history_newest_first() {
  let s = store().await;
  let p = pipeline(&s);
  s.land(vec![event("csv", "1")], at(1, 6)).await.unwrap();

  let first = p.run_quality_at(at(1, 7)).await.unwrap();
  let second = p.run_quality_at(at(1, 8)).await.unwrap();
  assert_eq!(first.kind, RunKind::Quality);
  assert_eq!(second.status, RunStatus::Success);

  let checks = marquee_core::quality::QualityGate::standard().check_names().len();
  let history = s.quality_history(None).await.unwrap();
  assert_eq!(history.len(), 2 * checks);
  assert!(history[..checks].iter().all(|r| r.run_id == second.run_id));
  assert!(history[checks..].iter().all(|r| r.run_id == first.run_id));

  let limited = s.quality_history(Some(3)).await.unwrap();
  assert_eq!(limited.len(), 3);
  assert_eq!(limited[0].checked_at, at(1, 8));

  // A quality run never touches landing data.
  assert_eq!(s.unprocessed().await.unwrap().len(), 1);
}

#[tokio::test]
async fn quality_failures_are_recorded_on_the_run() {
  let s = store().await;
  let mut bad = event("csv", "1");
  bad.fields.event_date = Some("03/11/2026".into());
  s.land(vec![bad], at(1, 6)).await.unwrap();

  let report = pipeline(&s).run_full_at(at(1, 7)).await.unwrap();
  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(report.quality, Some(QualityStatus::Failed));

  let history = s.quality_history(None).await.unwrap();
  let dates = history.iter().find(|r| r.check_name == "date_validity").unwrap();
  assert_eq!(dates.status, QualityStatus::Failed);
  assert_eq!(dates.records_failed, 1);
  assert_eq!(s.summary().await.unwrap().failed_checks, 1);
}

#[tokio::test]
async fn runs_are_listed_newest_first() {
  let s = store().await;
  let p = pipeline(&s);
  let full = p.run_full_at(at(1, 7)).await.unwrap();
  let quality = p.run_quality_at(at(1, 8)).await.unwrap();

  let runs = s.runs(None).await.unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0].run_id, quality.run_id);
  assert_eq!(runs[1].run_id, full.run_id);
  assert_eq!(runs[1].kind, RunKind::Full);
  assert_eq!(s.runs(Some(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn landing_runs_are_logged_with_their_counts() {
  let s = store().await;
  let report = pipeline(&s)
    .land_at(vec![event("csv", "1"), event("csv", "2")], at(1, 6))
    .await
    .unwrap();
  assert_eq!(report.kind, RunKind::Land);
  assert_eq!(report.status, RunStatus::Success);
  assert_eq!(report.records_fetched, 2);
  assert_eq!(report.records_loaded, 2);
  assert!(report.finished_at.unwrap() >= report.started_at);

  let runs = s.runs(None).await.unwrap();
  assert_eq!(runs.len(), 1);
  assert_eq!(runs[0].kind, RunKind::Land);
  assert_eq!(runs[0].records_loaded, 2);
  assert_eq!(s.unprocessed().await.unwrap().len(), 2);
}

/// Fails every fact that is not in euros.
struct EuroOnly;

impl QualityCheck for EuroOnly {
  fn name(&self) -> &'static str { "euro_only" }

  fn population(&self) -> &'static str { "fact_events" }

  fn policy(&self) -> ClassificationPolicy { ClassificationPolicy::WarnOnFailure }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    CheckOutcome {
      checked: input.facts.len() as u64,
      failed:  input
        .facts
        .iter()
        .filter(|f| f.measures.currency.as_deref() != Some("EUR"))
        .count() as u64,
    }
  }
}

#[tokio::test]
async fn custom_gate_replaces_the_standard_checks() {
  let s = store().await;
  let p = pipeline_with(&s, VenuePolicy::InsertOnce)
    .with_gate(QualityGate::empty().with_check(EuroOnly));
  assert_eq!(p.config().venue_policy, VenuePolicy::InsertOnce);

  p.store().land(vec![event("csv", "1")], at(1, 6)).await.unwrap();
  let report = p.run_full_at(at(1, 7)).await.unwrap();
  assert_eq!(report.quality, Some(QualityStatus::Warning));

  let history = p.store().quality_history(None).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].check_name, "euro_only");
  assert_eq!(history[0].population, "fact_events");
  assert_eq!(history[0].records_failed, 1);
}
