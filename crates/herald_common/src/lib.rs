//! Herald Common - Shared record schema and pure logic for Herald
//!
//! Everything the daemon persists lives in [`schema`]; [`merge`] is the
//! deep-merge used to reconcile partial updates and on-disk documents
//! against the current schema; [`leveling`] is the pure progression math.

pub mod leveling;
pub mod merge;
pub mod schema;

pub use schema::*;

/// Crate version, stamped into the persisted document's metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
