//! Core types and logic for the Marquee event warehouse.
//!
//! This crate is deliberately free of database dependencies. Storage backends
//! implement [`store::WarehouseStore`] and [`load::LoadTx`]; everything that
//! decides *what* gets written (normalization, dimension resolution, venue
//! versioning, fact reconciliation, quality scoring) lives here.

pub mod dimension;
pub mod error;
pub mod fact;
pub mod keys;
pub mod load;
pub mod measures;
pub mod pipeline;
pub mod quality;
pub mod raw;
pub mod reconciler;
pub mod resolver;
pub mod run;
pub mod staging;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
