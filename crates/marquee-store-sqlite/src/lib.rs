//! SQLite backend for the Marquee event warehouse.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each batch load runs inside one
//! `IMMEDIATE` transaction, which also serialises concurrent writers on the
//! venue dimension.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
