//! Derived fact measures: average price and base-currency normalization.
//!
//! The rate table is a static approximation. It is kept behind a small type so
//! a live rate lookup can replace it without touching the reconciler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_BASE_CURRENCY: &str = "EUR";

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 { (value * 100.0).round() / 100.0 }

/// `round(mean(min, max), 2)` when both are present, otherwise whichever one
/// is, otherwise `None`.
pub fn price_avg(min: Option<f64>, max: Option<f64>) -> Option<f64> {
  match (min, max) {
    (Some(lo), Some(hi)) => Some(round2((lo + hi) / 2.0)),
    (Some(p), None) | (None, Some(p)) => Some(p),
    (None, None) => None,
  }
}

// ─── RateTable ───────────────────────────────────────────────────────────────

/// Fixed multipliers converting an amount in some currency into the base
/// currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
  base:  String,
  rates: BTreeMap<String, f64>,
}

impl Default for RateTable {
  fn default() -> Self {
    let rates = [("USD", 0.92), ("GBP", 1.17), ("CHF", 1.05)]
      .into_iter()
      .map(|(code, rate)| (code.to_owned(), rate))
      .collect();
    Self { base: DEFAULT_BASE_CURRENCY.to_owned(), rates }
  }
}

impl RateTable {
  /// An empty table for `base`; only the identity conversion is known.
  pub fn new(base: &str) -> Self {
    Self { base: base.trim().to_uppercase(), rates: BTreeMap::new() }
  }

  /// Add or replace the multiplier for `code`. Rates must be positive and
  /// finite.
  pub fn with_rate(mut self, code: &str, rate: f64) -> Result<Self> {
    let code = code.trim().to_uppercase();
    if !rate.is_finite() || rate <= 0.0 {
      return Err(Error::InvalidRate { code, rate });
    }
    self.rates.insert(code, rate);
    Ok(self)
  }

  pub fn base(&self) -> &str { &self.base }

  /// Every non-base multiplier, keyed by upper-case currency code.
  pub fn rates(&self) -> &BTreeMap<String, f64> { &self.rates }

  /// The multiplier for `code`, or `None` if the code is unknown.
  pub fn rate(&self, code: &str) -> Option<f64> {
    if code == self.base {
      Some(1.0)
    } else {
      self.rates.get(code).copied()
    }
  }

  /// Convert `amount` into the base currency. Unknown or missing currency
  /// codes pass the amount through unconverted.
  pub fn normalize(&self, amount: Option<f64>, currency: Option<&str>) -> Option<f64> {
    let amount = amount?;
    let rate = currency.and_then(|c| self.rate(c)).unwrap_or(1.0);
    Some(round2(amount * rate))
  }
}
