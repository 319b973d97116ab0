use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::error;

use crate::error::StoreError;
use crate::store::{Dialect, SqlValue, Store};

pub struct PostgresStore {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
}

impl PostgresStore {
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
        let connection = tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self {
            client: Some(client),
            connection: Some(connection),
        })
    }

    fn client(&self) -> Result<&Client, StoreError> {
        self.client.as_ref().ok_or(StoreError::Closed)
    }
}

fn as_param(value: &SqlValue) -> &(dyn ToSql + Sync) {
    match value {
        SqlValue::Integer(v) => v as &(dyn ToSql + Sync),
        SqlValue::Float(v) => v as &(dyn ToSql + Sync),
        SqlValue::Text(v) => v as &(dyn ToSql + Sync),
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute_ddl(&mut self, sql: &str) -> Result<(), StoreError> {
        self.client()?.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
        let params: Vec<&(dyn ToSql + Sync)> = args.iter().map(as_param).collect();
        Ok(self.client()?.execute(sql, &params).await?)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        // Dropping the client ends the connection task.
        self.client.take();
        if let Some(connection) = self.connection.take() {
            let _ = connection.await;
        }
        Ok(())
    }
}
