use row_events::Record;
use tracing::{info, warn};

use crate::error::{InsertError, StoreError};
use crate::store::Store;
use crate::tabledef::TableDefinitions;

/// Creates every table that is not marked `ignore`.
pub async fn create_all(
    store: &mut dyn Store,
    tables: &TableDefinitions,
) -> Result<(), StoreError> {
    let dialect = store.dialect();
    for (_, table) in tables.iter().filter(|(_, table)| !table.ignore) {
        let sql = table.create_sql(dialect);
        info!(%sql, "create table");
        store.execute_ddl(&sql).await?;
    }
    Ok(())
}

/// Inserts `record` as one row of the table named by its type.
///
/// Records for ignored tables are dropped silently. Validation failures are
/// reported before the store is touched.
pub async fn insert(
    store: &mut dyn Store,
    tables: &TableDefinitions,
    record: &Record,
) -> Result<(), InsertError> {
    let Some(record_type) = record.record_type() else {
        return Err(InsertError::MissingType {
            record: record.to_string(),
        });
    };
    let table = tables
        .get(record_type)
        .ok_or_else(|| InsertError::UnknownTable(record_type.to_string()))?;
    if table.ignore {
        return Ok(());
    }

    let args = table.bind_args(record)?;
    let sql = table
        .insert_sql()
        .ok_or_else(|| InsertError::NotPrepared(table.name.clone()))?;
    if let Err(err) = store.execute(sql, &args).await {
        warn!(%sql, ?args, "insert failed");
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use row_events::MappedRecord;

    use super::*;
    use crate::store::{Dialect, SqlValue};
    use crate::tabledef::{ColumnDefinition, ColumnType, TableDefinition};

    #[derive(Default)]
    struct RecordingStore {
        ddl: Vec<String>,
        rows: Vec<(String, Vec<SqlValue>)>,
        fail_inserts: bool,
    }

    #[async_trait]
    impl Store for RecordingStore {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn execute_ddl(&mut self, sql: &str) -> Result<(), StoreError> {
            self.ddl.push(sql.to_string());
            Ok(())
        }

        async fn execute(&mut self, sql: &str, args: &[SqlValue]) -> Result<u64, StoreError> {
            if self.fail_inserts {
                return Err(StoreError::Closed);
            }
            self.rows.push((sql.to_string(), args.to_vec()));
            Ok(1)
        }

        async fn close(&mut self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn json(line: &str) -> Record {
        let serde_json::Value::Object(fields) = serde_json::from_str(line).unwrap() else {
            panic!("not an object");
        };
        Record::Mapped(MappedRecord::new(fields))
    }

    fn tables() -> TableDefinitions {
        let mut tables = TableDefinitions::new();
        let mut id = ColumnDefinition::new("id", ColumnType::Integer);
        id.not_null = true;
        tables.insert(
            "event",
            TableDefinition::new(
                "event",
                vec![id, ColumnDefinition::new("note", ColumnType::Text)],
            ),
        );
        let mut noise = TableDefinition::new("noise", vec![]);
        noise.ignore = true;
        tables.insert("noise", noise);
        tables.prepare(Dialect::Postgres);
        tables
    }

    #[tokio::test]
    async fn create_all_skips_ignored_tables() {
        let mut store = RecordingStore::default();
        create_all(&mut store, &tables()).await.unwrap();
        assert_eq!(
            store.ddl,
            vec![r#"CREATE TABLE IF NOT EXISTS "event" ("id" bigint NOT NULL, "note" text)"#]
        );
    }

    #[tokio::test]
    async fn inserts_in_column_order() {
        let mut store = RecordingStore::default();
        insert(&mut store, &tables(), &json(r#"{"note":"n","type":"event","id":4}"#))
            .await
            .unwrap();
        assert_eq!(
            store.rows,
            vec![(
                r#"INSERT INTO "event" VALUES ($1, $2)"#.to_string(),
                vec![SqlValue::Integer(Some(4)), SqlValue::Text(Some("n".into()))]
            )]
        );
    }

    #[tokio::test]
    async fn not_null_violation_never_reaches_store() {
        let mut store = RecordingStore::default();
        let err = insert(&mut store, &tables(), &json(r#"{"type":"event","note":"n"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, InsertError::NotNull { ref column, .. } if column == "id"));
        assert!(store.rows.is_empty());
    }

    #[tokio::test]
    async fn ignored_table_is_a_no_op() {
        let mut store = RecordingStore::default();
        insert(&mut store, &tables(), &json(r#"{"type":"noise","x":1}"#))
            .await
            .unwrap();
        assert!(store.rows.is_empty());
    }

    #[tokio::test]
    async fn missing_or_unknown_type_is_rejected() {
        let mut store = RecordingStore::default();
        assert!(matches!(
            insert(&mut store, &tables(), &json(r#"{"id":1}"#)).await,
            Err(InsertError::MissingType { .. })
        ));
        assert!(matches!(
            insert(&mut store, &tables(), &json(r#"{"type":"other"}"#)).await,
            Err(InsertError::UnknownTable(name)) if name == "other"
        ));
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let mut store = RecordingStore {
            fail_inserts: true,
            ..Default::default()
        };
        assert!(matches!(
            insert(&mut store, &tables(), &json(r#"{"type":"event","id":1}"#)).await,
            Err(InsertError::Store(StoreError::Closed))
        ));
    }
}
