use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue};
use rusqlite::{Connection, ToSql};

use crate::error::StoreError;
use crate::store::{Dialect, SqlValue, Store};

pub struct SqliteStore {
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Opens `path`, or an in-memory database when `path` is empty.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path.is_empty() {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(path))?
        };
        Ok(Self { conn: Some(conn) })
    }

    /// Borrows the underlying connection, for example to query written rows.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Integer(Some(i)) => SqliteValue::Integer(*i),
            SqlValue::Float(Some(x)) => SqliteValue::Real(*x),
            SqlValue::Text(Some(s)) => SqliteValue::Text(s.clone()),
            SqlValue::Integer(None) | SqlValue::Float(None) | SqlValue::Text(None) => {
                SqliteValue::Null
            }
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute_ddl(&mut self, sql: &str) -> Result<(), StoreError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        let changed = self
            .conn()?
            .execute(sql, rusqlite::params_from_iter(args.iter()))?;
        Ok(changed as u64)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
        }
        Ok(())
    }
}
