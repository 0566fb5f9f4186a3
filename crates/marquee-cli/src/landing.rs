//! Reading landing files: JSON lines carrying full landing records, or CSV
//! exports in the fixed event column layout.

use std::{
  io::{self, BufRead, BufReader, Read},
  path::Path,
};

use anyhow::{Context as _, bail};
use clap::ValueEnum;
use marquee_core::raw::{NewRawRecord, RawFields};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LandFormat {
  /// One JSON landing record per line.
  Jsonl,
  /// A CSV export with a header row.
  Csv,
}

impl LandFormat {
  /// `.csv` files are CSV; everything else, stdin included, is JSON lines.
  pub fn for_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
      _ => Self::Jsonl,
    }
  }
}

/// One row of a CSV export. Empty cells are absent values.
#[derive(Debug, Deserialize)]
struct CsvEventRow {
  event_id:      Option<String>,
  event_name:    Option<String>,
  event_date:    Option<String>,
  event_time:    Option<String>,
  venue_name:    Option<String>,
  venue_city:    Option<String>,
  venue_country: Option<String>,
  venue_lat:     Option<String>,
  venue_lon:     Option<String>,
  category:      Option<String>,
  subcategory:   Option<String>,
  price_min:     Option<String>,
  price_max:     Option<String>,
  currency:      Option<String>,
  url:           Option<String>,
  status:        Option<String>,
}

impl CsvEventRow {
  fn into_record(self, source: &str) -> Option<NewRawRecord> {
    let source_id = self.event_id.filter(|id| !id.trim().is_empty())?;
    Some(NewRawRecord {
      source: source.to_owned(),
      source_id,
      payload: None,
      fields: RawFields {
        event_name:    self.event_name,
        event_date:    self.event_date,
        event_time:    self.event_time,
        venue_name:    self.venue_name,
        venue_city:    self.venue_city,
        venue_country: self.venue_country,
        venue_lat:     self.venue_lat,
        venue_lon:     self.venue_lon,
        category:      self.category,
        subcategory:   self.subcategory,
        price_min:     self.price_min,
        price_max:     self.price_max,
        currency:      self.currency,
        url:           self.url,
        status:        self.status,
      },
    })
  }
}

/// Read every landing record in `path` (`-` reads stdin).
pub fn read_records(
  path: &Path,
  format: LandFormat,
  source: &str,
) -> anyhow::Result<Vec<NewRawRecord>> {
  let reader: Box<dyn BufRead> = if path == Path::new("-") {
    Box::new(io::stdin().lock())
  } else {
    let file = std::fs::File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    Box::new(BufReader::new(file))
  };

  match format {
    LandFormat::Jsonl => parse_json_lines(reader, path),
    LandFormat::Csv => parse_csv(reader, path, source),
  }
}

/// Parse one landing record per non-blank line.
fn parse_json_lines(reader: impl BufRead, path: &Path) -> anyhow::Result<Vec<NewRawRecord>> {
  let mut records = Vec::new();
  for (n, line) in reader.lines().enumerate() {
    let line = line.with_context(|| format!("failed to read {path:?}"))?;
    if line.trim().is_empty() {
      continue;
    }
    let record = serde_json::from_str(&line)
      .with_context(|| format!("{}:{}: invalid landing record", path.display(), n + 1))?;
    records.push(record);
  }
  Ok(records)
}

/// Parse a CSV export, attributing every row to `source`. Every row must
/// carry an `event_id`; it becomes the record's source id.
fn parse_csv(reader: impl Read, path: &Path, source: &str) -> anyhow::Result<Vec<NewRawRecord>> {
  if source.trim().is_empty() {
    bail!("landing source must not be blank");
  }

  let mut csv = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .from_reader(reader);

  let mut records = Vec::new();
  for row in csv.deserialize::<CsvEventRow>() {
    let row = row.with_context(|| format!("{}: invalid CSV row", path.display()))?;
    let Some(record) = row.into_record(source) else {
      // Header is line 1.
      bail!("{}:{}: missing event_id", path.display(), records.len() + 2);
    };
    records.push(record);
  }
  Ok(records)
}
