//! Error types for `marquee-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown quality status: {0:?}")]
  UnknownQualityStatus(String),

  #[error("unknown run status: {0:?}")]
  UnknownRunStatus(String),

  #[error("unknown run kind: {0:?}")]
  UnknownRunKind(String),

  #[error("invalid exchange rate for {code}: {rate}")]
  InvalidRate { code: String, rate: f64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
