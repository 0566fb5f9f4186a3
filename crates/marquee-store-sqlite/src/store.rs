//! [`SqliteStore`], the SQLite implementation of [`WarehouseStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;

use marquee_core::{
  dimension::{CategoryRow, DateRow, SourceRow, VenueAttrs, VenueVersion},
  fact::{EventFact, FactRow, UpsertOutcome},
  keys::{EventKey, VenueKey},
  load::{self, LoadContext, LoadOutcome, LoadTx},
  quality::QualityCheckResult,
  raw::{NewRawRecord, RawRecord},
  run::{RunReport, WarehouseSummary},
  staging::StagedRecord,
  store::WarehouseStore,
};

use crate::{
  encode::{
    encode_date, encode_dt, encode_time, encode_uuid, into_sql_error, RawFact, RawLanded,
    RawQualityResult, RawRun, RawVenue, FACT_COLUMNS, RAW_EVENT_COLUMNS, VENUE_COLUMNS,
  },
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Marquee warehouse backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn raw_where(&self, filter: &'static str) -> Result<Vec<RawRecord>> {
    let sql = format!("SELECT {RAW_EVENT_COLUMNS} FROM raw_events {filter} ORDER BY raw_id");
    let rows: Vec<RawLanded> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawLanded::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawLanded::into_record).collect()
  }
}

/// `LIMIT -1` means unlimited in SQLite.
fn sql_limit(limit: Option<usize>) -> i64 {
  limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

// ─── Load transaction ────────────────────────────────────────────────────────

/// [`LoadTx`] over an open SQLite transaction.
struct SqliteTx<'a> {
  conn: &'a rusqlite::Connection,
}

impl LoadTx for SqliteTx<'_> {
  type Error = rusqlite::Error;

  fn resolve_date(&mut self, row: &DateRow) -> rusqlite::Result<i64> {
    let full_date = encode_date(row.date);
    self.conn.execute(
      "INSERT INTO dim_date (
         full_date, day_of_week, day_name, week, month, month_name,
         quarter, year, is_weekend
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
       ON CONFLICT(full_date) DO NOTHING",
      rusqlite::params![
        full_date,
        row.day_of_week,
        row.day_name,
        row.week,
        row.month,
        row.month_name,
        row.quarter,
        row.year,
        row.is_weekend,
      ],
    )?;
    self.conn.query_row(
      "SELECT date_id FROM dim_date WHERE full_date = ?1",
      rusqlite::params![full_date],
      |r| r.get(0),
    )
  }

  fn resolve_category(&mut self, row: &CategoryRow) -> rusqlite::Result<i64> {
    self.conn.execute(
      "INSERT INTO dim_category (category, subcategory) VALUES (?1, ?2)
       ON CONFLICT(category, subcategory) DO NOTHING",
      rusqlite::params![row.category, row.subcategory],
    )?;
    self.conn.query_row(
      "SELECT category_id FROM dim_category WHERE category = ?1 AND subcategory = ?2",
      rusqlite::params![row.category, row.subcategory],
      |r| r.get(0),
    )
  }

  fn resolve_source(&mut self, row: &SourceRow) -> rusqlite::Result<i64> {
    self.conn.execute(
      "INSERT INTO dim_source (name, source_type) VALUES (?1, ?2)
       ON CONFLICT(name) DO NOTHING",
      rusqlite::params![row.name, row.source_type.as_ref()],
    )?;
    self.conn.query_row(
      "SELECT source_id FROM dim_source WHERE name = ?1",
      rusqlite::params![row.name],
      |r| r.get(0),
    )
  }

  fn current_venue(&mut self, key: &VenueKey) -> rusqlite::Result<Option<VenueVersion>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {VENUE_COLUMNS} FROM dim_venue WHERE venue_key = ?1 AND is_current = 1"),
        rusqlite::params![key.as_str()],
        RawVenue::from_row,
      )
      .optional()?;
    raw.map(RawVenue::into_version).transpose().map_err(into_sql_error)
  }

  fn close_venue(&mut self, venue_id: i64, valid_to: NaiveDate) -> rusqlite::Result<()> {
    self.conn.execute(
      "UPDATE dim_venue SET is_current = 0, valid_to = ?2
       WHERE venue_id = ?1 AND is_current = 1",
      rusqlite::params![venue_id, encode_date(valid_to)],
    )?;
    Ok(())
  }

  fn open_venue(&mut self, attrs: &VenueAttrs, valid_from: NaiveDate) -> rusqlite::Result<i64> {
    self.conn.execute(
      "INSERT INTO dim_venue (
         venue_key, name, city, country, lat, lon, valid_from, valid_to, is_current
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 1)",
      rusqlite::params![
        attrs.key().as_str(),
        attrs.name,
        attrs.city,
        attrs.country,
        attrs.lat,
        attrs.lon,
        encode_date(valid_from),
      ],
    )?;
    Ok(self.conn.last_insert_rowid())
  }

  fn upsert_fact(&mut self, row: &FactRow, now: DateTime<Utc>) -> rusqlite::Result<UpsertOutcome> {
    let existed = self
      .conn
      .query_row(
        "SELECT 1 FROM fact_events WHERE event_key = ?1",
        rusqlite::params![row.event_key.as_str()],
        |_| Ok(()),
      )
      .optional()?
      .is_some();

    let now_str = encode_dt(now);
    let m = &row.measures;
    // Dimension references and descriptive columns are fixed at first load;
    // only the measures follow the source.
    self.conn.execute(
      "INSERT INTO fact_events (
         event_key, source, source_event_id, date_id, venue_id, category_id,
         source_dim_id, event_name, event_date, event_time, url, status,
         price_min, price_max, price_avg, currency, price_normalized,
         is_deleted, loaded_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                 ?15, ?16, ?17, 0, ?18, ?18)
       ON CONFLICT(event_key) DO UPDATE SET
         status           = excluded.status,
         price_min        = excluded.price_min,
         price_max        = excluded.price_max,
         price_avg        = excluded.price_avg,
         currency         = excluded.currency,
         price_normalized = excluded.price_normalized,
         updated_at       = excluded.updated_at",
      rusqlite::params![
        row.event_key.as_str(),
        row.source,
        row.source_id,
        row.refs.date_id,
        row.refs.venue_id,
        row.refs.category_id,
        row.refs.source_id,
        row.event_name,
        row.event_date.map(encode_date),
        row.event_time.map(encode_time),
        row.url,
        m.status,
        m.price_min,
        m.price_max,
        m.price_avg,
        m.currency,
        m.price_normalized,
        now_str,
      ],
    )?;

    Ok(if existed { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
  }
}

// ─── WarehouseStore impl ─────────────────────────────────────────────────────

impl WarehouseStore for SqliteStore {
  type Error = crate::Error;

  // ── Landing ───────────────────────────────────────────────────────────────

  async fn land(
    &self,
    records: Vec<NewRawRecord>,
    ingested_at: DateTime<Utc>,
  ) -> Result<Vec<RawRecord>> {
    let at_str = encode_dt(ingested_at);
    let rows = records
      .into_iter()
      .map(|r| {
        let payload_json = r.payload.as_ref().map(serde_json::to_string).transpose()?;
        let key = EventKey::derive(&r.source, &r.source_id);
        Ok((r, key, payload_json))
      })
      .collect::<Result<Vec<_>>>()?;

    let landed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut landed = Vec::with_capacity(rows.len());
        {
          let mut stmt = tx.prepare(
            "INSERT INTO raw_events (
               source, source_id, event_key, payload_json, event_name,
               event_date, event_time, venue_name, venue_city, venue_country,
               venue_lat, venue_lon, category, subcategory, price_min,
               price_max, currency, url, status, ingested_at, is_processed
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20, 0)",
          )?;
          for (r, key, payload_json) in rows {
            let f = &r.fields;
            stmt.execute(rusqlite::params![
              r.source,
              r.source_id,
              key.as_str(),
              payload_json,
              f.event_name,
              f.event_date,
              f.event_time,
              f.venue_name,
              f.venue_city,
              f.venue_country,
              f.venue_lat,
              f.venue_lon,
              f.category,
              f.subcategory,
              f.price_min,
              f.price_max,
              f.currency,
              f.url,
              f.status,
              at_str,
            ])?;
            landed.push(RawRecord {
              raw_id: tx.last_insert_rowid(),
              source: r.source,
              source_id: r.source_id,
              payload: r.payload,
              fields: r.fields,
              ingested_at,
              processed: false,
            });
          }
        }
        tx.commit()?;
        Ok(landed)
      })
      .await?;

    debug!(count = landed.len(), "landed raw records");
    Ok(landed)
  }

  async fn unprocessed(&self) -> Result<Vec<RawRecord>> {
    self.raw_where("WHERE is_processed = 0").await
  }

  async fn raw_records(&self) -> Result<Vec<RawRecord>> { self.raw_where("").await }

  async fn mark_processed(&self, raw_ids: Vec<i64>) -> Result<u64> {
    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0u64;
        {
          let mut stmt = tx.prepare(
            "UPDATE raw_events SET is_processed = 1
             WHERE raw_id = ?1
               AND is_processed = 0
               AND event_key IN (SELECT event_key FROM fact_events)",
          )?;
          for id in raw_ids {
            changed += stmt.execute(rusqlite::params![id])? as u64;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed)
  }

  // ── Dimensions and facts ──────────────────────────────────────────────────

  async fn load_batch(&self, records: Vec<StagedRecord>, ctx: LoadContext) -> Result<LoadOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so two loads can never
        // both observe "no current version" for the same venue.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = load::load_batch(&mut SqliteTx { conn: &tx }, &records, &ctx)?;
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    debug!(?outcome, "batch committed");
    Ok(outcome)
  }

  async fn facts(&self) -> Result<Vec<EventFact>> {
    let rows: Vec<RawFact> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {FACT_COLUMNS} FROM fact_events ORDER BY event_key"))?;
        let rows = stmt
          .query_map([], RawFact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawFact::into_fact).collect()
  }

  async fn fact(&self, key: &EventKey) -> Result<Option<EventFact>> {
    let key_str = key.as_str().to_owned();
    let row: Option<RawFact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {FACT_COLUMNS} FROM fact_events WHERE event_key = ?1"),
              rusqlite::params![key_str],
              RawFact::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    row.map(RawFact::into_fact).transpose()
  }

  async fn soft_delete_fact(&self, key: &EventKey) -> Result<bool> {
    let key_str = key.as_str().to_owned();
    let now_str = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE fact_events SET is_deleted = 1, updated_at = ?2 WHERE event_key = ?1",
          rusqlite::params![key_str, now_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn venue_history(&self, key: &VenueKey) -> Result<Vec<VenueVersion>> {
    let key_str = key.as_str().to_owned();
    let rows: Vec<RawVenue> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VENUE_COLUMNS} FROM dim_venue WHERE venue_key = ?1
           ORDER BY valid_from, venue_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![key_str], RawVenue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawVenue::into_version).collect()
  }

  // ── Quality history ───────────────────────────────────────────────────────

  async fn append_quality(&self, results: Vec<QualityCheckResult>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO quality_log (
               run_id, check_name, population, records_checked,
               records_failed, pass_rate, status, checked_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for r in &results {
            stmt.execute(rusqlite::params![
              encode_uuid(r.run_id),
              r.check_name,
              r.population,
              r.records_checked as i64,
              r.records_failed as i64,
              r.pass_rate,
              r.status.as_ref(),
              encode_dt(r.checked_at),
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn quality_history(&self, limit: Option<usize>) -> Result<Vec<QualityCheckResult>> {
    let limit = sql_limit(limit);
    let rows: Vec<RawQualityResult> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, check_name, population, records_checked,
                  records_failed, pass_rate, status, checked_at
           FROM quality_log
           ORDER BY checked_at DESC, check_id DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawQualityResult::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawQualityResult::into_result).collect()
  }

  // ── Run log ───────────────────────────────────────────────────────────────

  async fn start_run(&self, run: &RunReport) -> Result<()> {
    let run_id = encode_uuid(run.run_id);
    let kind = run.kind.to_string();
    let status = run.status.to_string();
    let started_at = encode_dt(run.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO run_log (run_id, kind, status, started_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![run_id, kind, status, started_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn finish_run(&self, run: &RunReport) -> Result<()> {
    let run_id = encode_uuid(run.run_id);
    let status = run.status.to_string();
    let finished_at = run.finished_at.map(encode_dt);
    let counts = [
      run.records_fetched as i64,
      run.records_loaded as i64,
      run.records_skipped as i64,
      run.records_processed as i64,
    ];
    let quality = run.quality.map(|q| q.to_string());
    let error_message = run.error_message.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE run_log SET
             status            = ?2,
             finished_at       = ?3,
             records_fetched   = ?4,
             records_loaded    = ?5,
             records_skipped   = ?6,
             records_processed = ?7,
             quality           = ?8,
             error_message     = ?9
           WHERE run_id = ?1",
          rusqlite::params![
            run_id,
            status,
            finished_at,
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            quality,
            error_message,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn runs(&self, limit: Option<usize>) -> Result<Vec<RunReport>> {
    let limit = sql_limit(limit);
    let rows: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, kind, status, started_at, finished_at,
                  records_fetched, records_loaded, records_skipped,
                  records_processed, quality, error_message
           FROM run_log
           ORDER BY started_at DESC, rowid DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawRun::into_report).collect()
  }

  async fn summary(&self) -> Result<WarehouseSummary> {
    let counts: [i64; 12] = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM raw_events),
             (SELECT COUNT(*) FROM raw_events WHERE is_processed = 0),
             (SELECT COUNT(*) FROM fact_events),
             (SELECT COUNT(*) FROM fact_events WHERE is_deleted = 1),
             (SELECT COUNT(*) FROM dim_venue),
             (SELECT COUNT(*) FROM dim_venue WHERE is_current = 1),
             (SELECT COUNT(*) FROM dim_category),
             (SELECT COUNT(*) FROM dim_source),
             (SELECT COUNT(*) FROM dim_date),
             (SELECT COUNT(*) FROM quality_log),
             (SELECT COUNT(*) FROM quality_log WHERE status = 'failed'),
             (SELECT COUNT(*) FROM run_log)",
          [],
          |r| {
            let mut out = [0i64; 12];
            for (i, slot) in out.iter_mut().enumerate() {
              *slot = r.get(i)?;
            }
            Ok(out)
          },
        )?)
      })
      .await?;

    let [
      raw_records,
      unprocessed_records,
      facts,
      deleted_facts,
      venues,
      current_venues,
      categories,
      sources,
      dates,
      quality_checks,
      failed_checks,
      runs,
    ] = counts.map(|n| n as u64);

    Ok(WarehouseSummary {
      raw_records,
      unprocessed_records,
      facts,
      deleted_facts,
      venues,
      current_venues,
      categories,
      sources,
      dates,
      quality_checks,
      failed_checks,
      runs,
    })
  }
}
