//! `marquee`: command-line front end for the Marquee event warehouse.
//!
//! # Usage
//!
//! ```
//! marquee land events.jsonl
//! marquee land export.csv --source csv
//! marquee run
//! marquee history --limit 10
//! marquee --config ~/.config/marquee/marquee.toml summary
//! ```

mod landing;
mod settings;

use std::{io, path::PathBuf};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use marquee_core::{
  keys::{EventKey, VenueKey},
  pipeline::Pipeline,
  run::RunReport,
  staging::proper_noun,
  store::WarehouseStore,
};
use marquee_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::{
  landing::{LandFormat, read_records},
  settings::{Settings, expand_tilde},
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "marquee", version, about = "Incremental star-schema event warehouse")]
struct Cli {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "marquee.toml")]
  config: PathBuf,

  /// Print results as JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Append landing records from a JSON-lines or CSV file (`-` reads stdin).
  Land {
    file:   PathBuf,
    /// Input format; inferred from the file extension when omitted.
    #[arg(long, value_enum)]
    format: Option<LandFormat>,
    /// Source system name for CSV rows.
    #[arg(long, default_value = "csv")]
    source: String,
  },
  /// Normalize, load and quality-check everything not yet processed.
  Run,
  /// Evaluate the quality gate without loading anything.
  Quality,
  /// Warehouse counts.
  Summary,
  /// Latest quality check results.
  History {
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
  },
  /// Latest run records.
  Runs {
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
  },
  /// Version history of one venue.
  Venues { name: String, city: Option<String> },
  /// Soft-delete the fact for one source record.
  Delete { source: String, source_id: String },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let store_path = expand_tilde(&settings.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Land { file, format, source } => {
      let format = format.unwrap_or_else(|| LandFormat::for_path(&file));
      let records = read_records(&file, format, &source)?;
      let pipeline = Pipeline::new(store, settings.pipeline_config()?);
      let report = pipeline.land(records).await?;
      finish(cli.json, &report)?;
    }

    Command::Run => {
      let pipeline = Pipeline::new(store, settings.pipeline_config()?);
      let report = pipeline.run_full().await?;
      finish(cli.json, &report)?;
    }

    Command::Quality => {
      let pipeline = Pipeline::new(store, settings.pipeline_config()?);
      let report = pipeline.run_quality().await?;
      finish(cli.json, &report)?;
    }

    Command::Summary => {
      let s = store.summary().await?;
      emit(cli.json, &s, || {
        println!("raw records       {:>8}", s.raw_records);
        println!("  unprocessed     {:>8}", s.unprocessed_records);
        println!("facts             {:>8}", s.facts);
        println!("  deleted         {:>8}", s.deleted_facts);
        println!("venue versions    {:>8}", s.venues);
        println!("  current         {:>8}", s.current_venues);
        println!("categories        {:>8}", s.categories);
        println!("sources           {:>8}", s.sources);
        println!("dates             {:>8}", s.dates);
        println!("quality checks    {:>8}", s.quality_checks);
        println!("  failed          {:>8}", s.failed_checks);
        println!("runs              {:>8}", s.runs);
      })?;
    }

    Command::History { limit } => {
      let history = store.quality_history(Some(limit)).await?;
      emit(cli.json, &history, || {
        for r in &history {
          println!(
            "{}  {:<26} {:<8} {:>6}/{:<6} {:>6.2}%  {}",
            r.checked_at.format("%Y-%m-%d %H:%M:%S"),
            r.check_name,
            r.status,
            r.records_failed,
            r.records_checked,
            r.pass_rate,
            r.run_id,
          );
        }
      })?;
    }

    Command::Runs { limit } => {
      let runs = store.runs(Some(limit)).await?;
      emit(cli.json, &runs, || {
        for r in &runs {
          println!(
            "{}  {}  {:<7} {:<7} fetched={} loaded={} skipped={} processed={}{}",
            r.started_at.format("%Y-%m-%d %H:%M:%S"),
            r.run_id,
            r.kind,
            r.status,
            r.records_fetched,
            r.records_loaded,
            r.records_skipped,
            r.records_processed,
            r.error_message.as_deref().map(|m| format!("  error: {m}")).unwrap_or_default(),
          );
        }
      })?;
    }

    Command::Venues { name, city } => {
      let Some(name) = proper_noun(Some(&name)) else {
        bail!("venue name must not be blank");
      };
      let city = proper_noun(city.as_deref());
      let key = VenueKey::derive(&name, city.as_deref());
      let history = store.venue_history(&key).await?;
      emit(cli.json, &history, || {
        if history.is_empty() {
          println!("no versions for {name} ({})", city.as_deref().unwrap_or("-"));
        }
        for v in &history {
          println!(
            "#{:<5} {} .. {}  {}  country={} lat={} lon={}",
            v.venue_id,
            v.valid_from,
            v.valid_to.map(|d| d.to_string()).unwrap_or_else(|| "current".into()),
            v.attrs.name,
            v.attrs.country.as_deref().unwrap_or("-"),
            v.attrs.lat.map(|x| x.to_string()).unwrap_or_else(|| "-".into()),
            v.attrs.lon.map(|x| x.to_string()).unwrap_or_else(|| "-".into()),
          );
        }
      })?;
    }

    Command::Delete { source, source_id } => {
      let key = EventKey::derive(&source, &source_id);
      if !store.soft_delete_fact(&key).await? {
        bail!("no fact for {source}/{source_id}");
      }
      info!(%key, "fact soft-deleted");
    }
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Print `value` as JSON, or run the text renderer.
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(value)?);
  } else {
    text();
  }
  Ok(())
}

/// Report a run and turn a failed one into a non-zero exit.
fn finish(json: bool, report: &RunReport) -> anyhow::Result<()> {
  emit(json, report, || {
    println!("run {} {} ({})", report.run_id, report.status, report.kind);
    println!(
      "  fetched={} loaded={} skipped={} processed={}",
      report.records_fetched,
      report.records_loaded,
      report.records_skipped,
      report.records_processed,
    );
    if let Some(q) = report.quality {
      println!("  quality={q}");
    }
  })?;

  if !report.is_success() {
    bail!(
      "run {} failed: {}",
      report.run_id,
      report.error_message.as_deref().unwrap_or("unknown error")
    );
  }
  Ok(())
}
