//! The quality gate: a battery of independent checks that score a snapshot
//! of the landing and fact stores.
//!
//! The gate observes; it never blocks a run. Every evaluation appends one
//! [`QualityCheckResult`] per check, and the accumulated history is the
//! product.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{
  fact::EventFact,
  keys::EventKey,
  measures::round2,
  raw::RawRecord,
  staging::{StagedRecord, is_strict_date, normalize},
};

// ─── Classification ──────────────────────────────────────────────────────────

/// Ordered from best to worst.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QualityStatus {
  Passed,
  Warning,
  Failed,
}

/// Failure ratio below which a missing event name is only a warning.
pub const REQUIRED_FIELDS_WARN_BELOW: f64 = 0.05;
/// Failure ratio below which malformed dates are only a warning.
pub const DATE_VALIDITY_WARN_BELOW: f64 = 0.10;

/// Maps a check's failure ratio to a [`QualityStatus`]. Zero failures always
/// pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ClassificationPolicy {
  /// Warning while the failure ratio is below `warn_below`, failed from
  /// there on.
  Tiered { warn_below: f64 },
  /// Any failure is a warning; the check never fails outright.
  WarnOnFailure,
}

impl ClassificationPolicy {
  pub fn classify(&self, outcome: &CheckOutcome) -> QualityStatus {
    if outcome.failed == 0 {
      return QualityStatus::Passed;
    }
    match *self {
      Self::Tiered { warn_below } if outcome.failure_ratio() < warn_below => {
        QualityStatus::Warning
      }
      Self::Tiered { .. } => QualityStatus::Failed,
      Self::WarnOnFailure => QualityStatus::Warning,
    }
  }
}

/// Raw counts produced by one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
  pub checked: u64,
  pub failed:  u64,
}

impl CheckOutcome {
  pub fn failure_ratio(&self) -> f64 {
    if self.checked == 0 {
      0.0
    } else {
      self.failed as f64 / self.checked as f64
    }
  }

  /// Percentage of the population that passed, to two decimals. An empty
  /// population passes completely.
  pub fn pass_rate(&self) -> f64 {
    if self.checked == 0 {
      100.0
    } else {
      round2(100.0 * (self.checked.saturating_sub(self.failed)) as f64 / self.checked as f64)
    }
  }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// The data a gate run inspects: every landed record, its staged view, and
/// every fact.
pub struct QualityInput<'a> {
  pub raw:    &'a [RawRecord],
  pub staged: Vec<StagedRecord>,
  pub facts:  &'a [EventFact],
}

impl<'a> QualityInput<'a> {
  pub fn new(raw: &'a [RawRecord], facts: &'a [EventFact]) -> Self {
    Self { raw, staged: raw.iter().map(normalize).collect(), facts }
  }
}

// ─── Checks ──────────────────────────────────────────────────────────────────

/// One independent data-quality check.
pub trait QualityCheck: Send + Sync {
  /// Stable identifier recorded in the history.
  fn name(&self) -> &'static str;

  /// The population this check scores.
  fn population(&self) -> &'static str;

  fn policy(&self) -> ClassificationPolicy;

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome;
}

/// Every landed record must carry an event name.
pub struct RequiredFields;

impl QualityCheck for RequiredFields {
  fn name(&self) -> &'static str { "required_fields" }

  fn population(&self) -> &'static str { "raw_events" }

  fn policy(&self) -> ClassificationPolicy {
    ClassificationPolicy::Tiered { warn_below: REQUIRED_FIELDS_WARN_BELOW }
  }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    CheckOutcome {
      checked: input.staged.len() as u64,
      failed:  input.staged.iter().filter(|s| s.event_name.is_none()).count() as u64,
    }
  }
}

/// Every landed record's date must match `YYYY-MM-DD`. A missing date fails.
pub struct DateValidity;

impl QualityCheck for DateValidity {
  fn name(&self) -> &'static str { "date_validity" }

  fn population(&self) -> &'static str { "raw_events" }

  fn policy(&self) -> ClassificationPolicy {
    ClassificationPolicy::Tiered { warn_below: DATE_VALIDITY_WARN_BELOW }
  }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    let failed = input
      .raw
      .iter()
      .filter(|r| !r.fields.event_date.as_deref().is_some_and(is_strict_date))
      .count();
    CheckOutcome { checked: input.raw.len() as u64, failed: failed as u64 }
  }
}

/// Among records with both prices parsed, the minimum must not exceed the
/// maximum.
pub struct PriceOrdering;

impl QualityCheck for PriceOrdering {
  fn name(&self) -> &'static str { "price_ordering" }

  fn population(&self) -> &'static str { "staged_events" }

  fn policy(&self) -> ClassificationPolicy { ClassificationPolicy::WarnOnFailure }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::default();
    for (min, max) in input.staged.iter().filter_map(|s| s.price_min.zip(s.price_max)) {
      outcome.checked += 1;
      if min > max {
        outcome.failed += 1;
      }
    }
    outcome
  }
}

/// No (source, source id) pair should be landed more than once. Both counts
/// are in rows: every row of a duplicated group fails, including the first.
pub struct DuplicateIds;

impl QualityCheck for DuplicateIds {
  fn name(&self) -> &'static str { "duplicate_ids" }

  fn population(&self) -> &'static str { "raw_events" }

  fn policy(&self) -> ClassificationPolicy { ClassificationPolicy::WarnOnFailure }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    let mut groups: BTreeMap<EventKey, usize> = BTreeMap::new();
    for record in input.raw {
      *groups.entry(record.event_key()).or_default() += 1;
    }
    CheckOutcome {
      checked: input.raw.len() as u64,
      failed:  groups.values().filter(|&&n| n > 1).sum::<usize>() as u64,
    }
  }
}

/// Every live fact should reference a date, a venue and a category.
pub struct ReferentialCompleteness;

impl QualityCheck for ReferentialCompleteness {
  fn name(&self) -> &'static str { "referential_completeness" }

  fn population(&self) -> &'static str { "fact_events" }

  fn policy(&self) -> ClassificationPolicy { ClassificationPolicy::WarnOnFailure }

  fn evaluate(&self, input: &QualityInput<'_>) -> CheckOutcome {
    let mut outcome = CheckOutcome::default();
    for fact in input.facts.iter().filter(|f| !f.is_deleted) {
      outcome.checked += 1;
      if !fact.refs.is_complete() {
        outcome.failed += 1;
      }
    }
    outcome
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// One appended row of quality history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheckResult {
  pub run_id:          Uuid,
  pub check_name:      String,
  pub population:      String,
  pub records_checked: u64,
  pub records_failed:  u64,
  /// Percentage, two decimals.
  pub pass_rate:       f64,
  pub status:          QualityStatus,
  pub checked_at:      DateTime<Utc>,
}

// ─── Gate ────────────────────────────────────────────────────────────────────

/// An ordered collection of checks. Checks are independent; order only
/// affects the order of the emitted results.
pub struct QualityGate {
  checks: Vec<Box<dyn QualityCheck>>,
}

impl Default for QualityGate {
  fn default() -> Self { Self::standard() }
}

impl QualityGate {
  /// The five reference checks.
  pub fn standard() -> Self {
    Self {
      checks: vec![
        Box::new(RequiredFields),
        Box::new(DateValidity),
        Box::new(PriceOrdering),
        Box::new(DuplicateIds),
        Box::new(ReferentialCompleteness),
      ],
    }
  }

  pub fn empty() -> Self { Self { checks: Vec::new() } }

  pub fn with_check(mut self, check: impl QualityCheck + 'static) -> Self {
    self.checks.push(Box::new(check));
    self
  }

  pub fn check_names(&self) -> Vec<&'static str> {
    self.checks.iter().map(|c| c.name()).collect()
  }

  /// Evaluate every check against `input`.
  pub fn evaluate(
    &self,
    input: &QualityInput<'_>,
    run_id: Uuid,
    checked_at: DateTime<Utc>,
  ) -> Vec<QualityCheckResult> {
    self
      .checks
      .iter()
      .map(|check| {
        let outcome = check.evaluate(input);
        QualityCheckResult {
          run_id,
          check_name: check.name().to_owned(),
          population: check.population().to_owned(),
          records_checked: outcome.checked,
          records_failed: outcome.failed,
          pass_rate: outcome.pass_rate(),
          status: check.policy().classify(&outcome),
          checked_at,
        }
      })
      .collect()
  }
}
