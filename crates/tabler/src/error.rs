use std::path::PathBuf;

use row_events::IngestError;
use thiserror::Error;

use crate::tabledef::ColumnType;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read table definitions `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table definitions `{path}` exceed {limit} bytes")]
    TooLarge { path: PathBuf, limit: usize },
    #[error("failed to parse table definitions: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize table definitions: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported data source name `{0}`")]
    UnsupportedDsn(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("store connection is closed")]
    Closed,
}

/// Failure to derive a table layout from a record.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("record has no type: {record}")]
    MissingType { record: String },
    #[error("cannot infer type of column `{column}` for table `{table}`")]
    UnknownColumnType { table: String, column: String },
}

/// Failure to persist one record. Never aborts the run.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("record had invalid or missing type: {record}")]
    MissingType { record: String },
    #[error("record type `{0}` not found in table definitions")]
    UnknownTable(String),
    #[error("missing value for not-null column `{column}` in table `{table}`")]
    NotNull { table: String, column: String },
    #[error("column `{column}` in table `{table}` expects {expected}, got {found}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: ColumnType,
        found: &'static str,
    },
    #[error("insert statement for table `{0}` was not prepared")]
    NotPrepared(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Setup and run errors surfaced to the process exit status.
#[derive(Debug, Error)]
pub enum TablerError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session used before init")]
    NotInitialized,
}
