//! Relational stores the sink writes into.
//!
//! A store only has to run DDL, run parameterized DML with positional
//! arguments, and report which placeholder dialect it speaks.

mod postgres;
mod sqlite;

use async_trait::async_trait;
use tracing::info;

use crate::error::StoreError;
use crate::tabledef::ColumnType;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite3",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn storage_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (Dialect::Sqlite, ColumnType::Float) => "float",
            (Dialect::Sqlite, ColumnType::Integer | ColumnType::Boolean) => "integer",
            (Dialect::Postgres, ColumnType::Float) => "double precision",
            (Dialect::Postgres, ColumnType::Integer | ColumnType::Boolean) => "bigint",
            (_, ColumnType::Text) => "text",
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Comma separated placeholders for `count` positional arguments.
    pub fn placeholders(&self, count: usize) -> String {
        let marks: Vec<String> = match self {
            Dialect::Sqlite => vec!["?".to_string(); count],
            Dialect::Postgres => (1..=count).map(|idx| format!("${idx}")).collect(),
        };
        marks.join(", ")
    }
}

/// Nullable argument value tagged with its storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
}

impl SqlValue {
    pub fn null(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Integer | ColumnType::Boolean => SqlValue::Integer(None),
            ColumnType::Float => SqlValue::Float(None),
            ColumnType::Text => SqlValue::Text(None),
        }
    }
}

#[async_trait]
pub trait Store: Send {
    fn dialect(&self) -> Dialect;

    async fn execute_ddl(&mut self, sql: &str) -> Result<(), StoreError>;

    /// Runs one statement with positional arguments; returns affected rows.
    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError>;

    /// Closes the connection. Later calls are no-ops.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Opens a store from a data source name.
///
/// `sqlite://PATH` and `sqlite3://PATH` open a SQLite file (an empty path is
/// an in-memory database); `postgres://` and `postgresql://` URLs are handed
/// to the PostgreSQL driver unchanged.
pub async fn connect(dsn: &str) -> Result<Box<dyn Store>, StoreError> {
    let (scheme, rest) = dsn
        .split_once("://")
        .ok_or_else(|| StoreError::UnsupportedDsn(dsn.to_string()))?;
    let store: Box<dyn Store> = match scheme {
        "sqlite" | "sqlite3" => Box::new(SqliteStore::open(rest)?),
        "postgres" | "postgresql" => Box::new(PostgresStore::connect(dsn).await?),
        _ => return Err(StoreError::UnsupportedDsn(dsn.to_string())),
    };
    info!(dialect = store.dialect().as_str(), "connected to store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Sqlite.placeholders(3), "?, ?, ?");
        assert_eq!(Dialect::Postgres.placeholders(3), "$1, $2, $3");
        assert_eq!(Dialect::Sqlite.placeholders(0), "");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(Dialect::Sqlite.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn connect_rejects_unknown_schemes() {
        for dsn in ["mysql://localhost/db", "no-scheme"] {
            assert!(matches!(
                connect(dsn).await,
                Err(StoreError::UnsupportedDsn(name)) if name == dsn
            ));
        }
    }

    #[tokio::test]
    async fn connect_opens_in_memory_sqlite() {
        let mut store = connect("sqlite://").await.unwrap();
        assert_eq!(store.dialect(), Dialect::Sqlite);
        store.execute_ddl("CREATE TABLE t (a integer)").await.unwrap();
        store.close().await.unwrap();
    }
}
