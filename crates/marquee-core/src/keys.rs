//! Natural keys: stable identities derived from source or content
//! attributes, as opposed to store-assigned surrogate keys.
//!
//! Both keys are lowercase hex SHA-256 digests over their parts joined with a
//! unit separator, so `("ab", "c")` and `("a", "bc")` never collide.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SEPARATOR: u8 = 0x1f;

fn digest(parts: &[&str]) -> String {
  let mut hasher = Sha256::new();
  for (i, part) in parts.iter().enumerate() {
    if i > 0 {
      hasher.update([SEPARATOR]);
    }
    hasher.update(part.as_bytes());
  }
  hex::encode(hasher.finalize())
}

// ─── EventKey ────────────────────────────────────────────────────────────────

/// Identity of an event fact: a function of (source, source-local id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
  pub fn derive(source: &str, source_id: &str) -> Self {
    Self(digest(&[source.trim(), source_id.trim()]))
  }

  /// Wrap a key previously produced by [`EventKey::derive`], e.g. one read
  /// back from storage.
  pub fn from_stored(key: String) -> Self { Self(key) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EventKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── VenueKey ────────────────────────────────────────────────────────────────

/// Identity of a venue across all of its versions: a function of the
/// normalized (name, city) pair. A missing city hashes as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueKey(String);

impl VenueKey {
  pub fn derive(name: &str, city: Option<&str>) -> Self {
    Self(digest(&[name.trim(), city.map(str::trim).unwrap_or_default()]))
  }

  pub fn from_stored(key: String) -> Self { Self(key) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for VenueKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
