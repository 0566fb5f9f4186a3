//! Runtime configuration, layered from an optional TOML file and
//! `MARQUEE_`-prefixed environment variables.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use marquee_core::{
  dimension::{VenuePolicy, DEFAULT_COORDINATE_TOLERANCE},
  measures::RateTable,
  pipeline::PipelineConfig,
};
use serde::Deserialize;

/// Which venue versioning behaviour to apply on repeat sightings.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
  #[default]
  Revise,
  InsertOnce,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
  pub store_path:           PathBuf,
  pub venue_policy:         PolicyName,
  pub coordinate_tolerance: f64,
  pub base_currency:        String,
  /// Replaces the built-in rate table entirely when present.
  pub rates:                BTreeMap<String, f64>,
}

impl Default for Settings {
  fn default() -> Self {
    let defaults = RateTable::default();
    Self {
      store_path:           PathBuf::from("marquee.db"),
      venue_policy:         PolicyName::default(),
      coordinate_tolerance: DEFAULT_COORDINATE_TOLERANCE,
      base_currency:        defaults.base().to_owned(),
      rates:                defaults.rates().clone(),
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("MARQUEE"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
    let venue_policy = match self.venue_policy {
      PolicyName::Revise => VenuePolicy::Revise { tolerance: self.coordinate_tolerance },
      PolicyName::InsertOnce => VenuePolicy::InsertOnce,
    };

    let mut rates = RateTable::new(&self.base_currency);
    for (code, rate) in &self.rates {
      rates = rates.with_rate(code, *rate).context("invalid rate table")?;
    }

    Ok(PipelineConfig { venue_policy, rates })
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  fn parse(toml: &str) -> Settings {
    config::Config::builder()
      .add_source(config::File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_yields_defaults() {
    let settings = parse("");
    assert_eq!(settings.store_path, PathBuf::from("marquee.db"));
    assert_eq!(settings.venue_policy, PolicyName::Revise);

    let cfg = settings.pipeline_config().unwrap();
    assert_eq!(cfg, PipelineConfig::default());
  }

  #[test]
  fn insert_once_and_custom_rates() {
    let settings = parse(
      r#"
        venue_policy = "insert_once"
        base_currency = "usd"

        [rates]
        EUR = 1.09
      "#,
    );
    let cfg = settings.pipeline_config().unwrap();
    assert_eq!(cfg.venue_policy, VenuePolicy::InsertOnce);
    assert_eq!(cfg.rates.base(), "USD");
    assert_eq!(cfg.rates.rate("EUR"), Some(1.09));
    assert_eq!(cfg.rates.rate("GBP"), None);
  }

  #[test]
  fn revise_carries_the_configured_tolerance() {
    let settings = parse("coordinate_tolerance = 0.001");
    let cfg = settings.pipeline_config().unwrap();
    assert_eq!(cfg.venue_policy, VenuePolicy::Revise { tolerance: 0.001 });
  }

  #[test]
  fn non_positive_rates_are_rejected() {
    let settings = parse("[rates]\nGBP = 0.0");
    assert!(settings.pipeline_config().is_err());
  }

  #[test]
  fn tilde_expands_to_home() {
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/w.db")), PathBuf::from(home).join("w.db"));
    }
    assert_eq!(expand_tilde(Path::new("/tmp/w.db")), PathBuf::from("/tmp/w.db"));
  }
}
