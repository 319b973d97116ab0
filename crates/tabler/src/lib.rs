#![forbid(unsafe_code)]
//! Turns streams of typed event records into relational table rows.
//!
//! Two run modes share one [`Session`]:
//! - schema generation feeds records into a [`TableShaper`] and exports the
//!   inferred [`TableDefinitions`];
//! - write mode loads definitions, creates the tables in a [`Store`] and
//!   inserts one row per record.
//!
//! Per-record failures are logged and skipped; only setup errors end a run.

mod error;
mod session;
mod shaper;
pub mod sink;
pub mod store;
mod tabledef;

pub use error::{InsertError, SchemaError, ShapeError, StoreError, TablerError};
pub use session::{Session, WriteSummary};
pub use shaper::TableShaper;
pub use store::{Dialect, SqlValue, Store};
pub use tabledef::{
    ColumnDefinition, ColumnType, TableDefinition, TableDefinitions, MAX_DEFINITIONS_BYTES,
};
