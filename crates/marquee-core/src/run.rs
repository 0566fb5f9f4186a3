//! Run records reported to orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::quality::QualityStatus;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunKind {
  /// Append a batch to the landing store.
  Land,
  /// normalize → resolve → reconcile → mark processed → quality.
  Full,
  /// Quality gate only.
  Quality,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
  Running,
  Success,
  Failed,
}

/// One pipeline run, as recorded in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id:            Uuid,
  pub kind:              RunKind,
  pub status:            RunStatus,
  pub started_at:        DateTime<Utc>,
  pub finished_at:       Option<DateTime<Utc>>,
  /// Unprocessed raw records in the run's snapshot, or records offered to a
  /// landing run.
  pub records_fetched:   u64,
  /// Facts inserted or merged, or raw records appended by a landing run.
  pub records_loaded:    u64,
  /// Snapshot records dropped before loading (duplicates and unnamed).
  pub records_skipped:   u64,
  /// Raw records whose processed flag this run flipped.
  pub records_processed: u64,
  /// The worst status among this run's quality checks, if any ran.
  pub quality:           Option<QualityStatus>,
  pub error_message:     Option<String>,
}

impl RunReport {
  pub fn start(kind: RunKind, started_at: DateTime<Utc>) -> Self {
    Self {
      run_id: Uuid::new_v4(),
      kind,
      status: RunStatus::Running,
      started_at,
      finished_at: None,
      records_fetched: 0,
      records_loaded: 0,
      records_skipped: 0,
      records_processed: 0,
      quality: None,
      error_message: None,
    }
  }

  pub fn succeed(&mut self, at: DateTime<Utc>) {
    self.status = RunStatus::Success;
    self.finished_at = Some(at);
  }

  pub fn fail(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
    self.status = RunStatus::Failed;
    self.finished_at = Some(at);
    self.error_message = Some(message.into());
  }

  pub fn is_success(&self) -> bool { self.status == RunStatus::Success }
}

/// Point-in-time counts over the whole warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSummary {
  pub raw_records:         u64,
  pub unprocessed_records: u64,
  pub facts:               u64,
  pub deleted_facts:       u64,
  pub venues:              u64,
  pub current_venues:      u64,
  pub categories:          u64,
  pub sources:             u64,
  pub dates:               u64,
  pub quality_checks:      u64,
  pub failed_checks:       u64,
  pub runs:                u64,
}
