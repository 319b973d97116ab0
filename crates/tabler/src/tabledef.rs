//! Table layouts and the SQL derived from them.
//!
//! The serialized form maps a record type to
//! `{"name", "columns": [{"name", "type", "notNull"}], "ignore"}`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use row_events::{Record, Value};
use serde::{Deserialize, Serialize};

use crate::error::{InsertError, SchemaError};
use crate::store::{Dialect, SqlValue};

/// Upper bound on the size of a table definitions document.
pub const MAX_DEFINITIONS_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Float,
    Integer,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Text(_) => ColumnType::Text,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Float => "float",
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(rename = "notNull", default)]
    pub not_null: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
        }
    }

    fn create_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!(
            "{} {}",
            dialect.quote_ident(&self.name),
            dialect.storage_type(self.column_type)
        );
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    /// Projects a record value onto this column's storage class.
    fn bind(&self, table: &str, value: Option<Value>) -> Result<SqlValue, InsertError> {
        let mismatch = |found: &'static str| InsertError::TypeMismatch {
            table: table.to_string(),
            column: self.name.clone(),
            expected: self.column_type,
            found,
        };

        let Some(value) = value else {
            if self.not_null {
                return Err(InsertError::NotNull {
                    table: table.to_string(),
                    column: self.name.clone(),
                });
            }
            return Ok(SqlValue::null(self.column_type));
        };

        match (self.column_type, value) {
            (ColumnType::Integer | ColumnType::Boolean, Value::Integer(i)) => {
                Ok(SqlValue::Integer(Some(i)))
            }
            (ColumnType::Integer | ColumnType::Boolean, Value::Boolean(b)) => {
                Ok(SqlValue::Integer(Some(i64::from(b))))
            }
            (ColumnType::Float, Value::Float(x)) => Ok(SqlValue::Float(Some(x))),
            (ColumnType::Float, Value::Integer(i)) => Ok(SqlValue::Float(Some(i as f64))),
            (ColumnType::Text, Value::Text(s)) => Ok(SqlValue::Text(Some(s))),
            (_, other) => Err(mismatch(other.kind())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub ignore: bool,
    #[serde(skip)]
    insert_sql: Option<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
            ignore: false,
            insert_sql: None,
        }
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| column.create_sql(dialect))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote_ident(&self.name),
            columns.join(", ")
        )
    }

    pub fn build_insert_sql(&self, dialect: Dialect) -> String {
        format!(
            "INSERT INTO {} VALUES ({})",
            dialect.quote_ident(&self.name),
            dialect.placeholders(self.columns.len())
        )
    }

    /// Caches the insert statement for `dialect`.
    pub fn prepare(&mut self, dialect: Dialect) {
        self.insert_sql = Some(self.build_insert_sql(dialect));
    }

    pub fn insert_sql(&self) -> Option<&str> {
        self.insert_sql.as_deref()
    }

    /// Positional arguments for `record` in column order.
    ///
    /// Fails before anything reaches the store if a not-null column has no
    /// value or a value does not fit its column.
    pub fn bind_args(&self, record: &Record) -> Result<Vec<SqlValue>, InsertError> {
        self.columns
            .iter()
            .map(|column| column.bind(&self.name, record.value(&column.name)))
            .collect()
    }
}

/// Table definitions keyed by record type, in sorted key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableDefinitions(BTreeMap<String, TableDefinition>);

impl TableDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a size-bounded definitions document. Tables without a name take
    /// the name of their key.
    pub fn read_file(path: &Path) -> Result<Self, SchemaError> {
        let read_err = |source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;
        let mut buf = Vec::new();
        file.take(MAX_DEFINITIONS_BYTES as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(read_err)?;
        if buf.len() > MAX_DEFINITIONS_BYTES {
            return Err(SchemaError::TooLarge {
                path: path.to_path_buf(),
                limit: MAX_DEFINITIONS_BYTES,
            });
        }
        Self::from_slice(&buf)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut tables: Self = serde_json::from_slice(bytes).map_err(SchemaError::Parse)?;
        for (key, table) in tables.0.iter_mut() {
            if table.name.is_empty() {
                table.name = key.clone();
            }
        }
        Ok(tables)
    }

    /// Pretty-printed JSON with four-space indentation.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, SchemaError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)
            .map_err(SchemaError::Serialize)?;
        Ok(out)
    }

    /// Caches insert statements for every table that is written to.
    pub fn prepare(&mut self, dialect: Dialect) {
        for table in self.0.values_mut().filter(|table| !table.ignore) {
            table.prepare(dialect);
        }
    }

    pub fn get(&self, record_type: &str) -> Option<&TableDefinition> {
        self.0.get(record_type)
    }

    pub fn contains(&self, record_type: &str) -> bool {
        self.0.contains_key(record_type)
    }

    pub fn insert(&mut self, record_type: impl Into<String>, table: TableDefinition) {
        self.0.insert(record_type.into(), table);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableDefinition)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn click_table() -> TableDefinition {
        TableDefinition::new(
            "click",
            vec![
                ColumnDefinition::new("x", ColumnType::Integer),
                ColumnDefinition::new("y", ColumnType::Float),
                ColumnDefinition::new("ok", ColumnType::Boolean),
            ],
        )
    }

    fn json_record(line: &str) -> Record {
        let serde_json::Value::Object(fields) = serde_json::from_str(line).unwrap() else {
            panic!("not an object");
        };
        Record::Mapped(row_events::MappedRecord::new(fields))
    }

    #[test]
    fn sql_per_dialect() {
        let table = click_table();
        assert_eq!(
            table.create_sql(Dialect::Sqlite),
            r#"CREATE TABLE IF NOT EXISTS "click" ("x" integer, "y" float, "ok" integer)"#
        );
        assert_eq!(
            table.create_sql(Dialect::Postgres),
            r#"CREATE TABLE IF NOT EXISTS "click" ("x" bigint, "y" double precision, "ok" bigint)"#
        );
        assert_eq!(
            table.build_insert_sql(Dialect::Sqlite),
            r#"INSERT INTO "click" VALUES (?, ?, ?)"#
        );
        assert_eq!(
            table.build_insert_sql(Dialect::Postgres),
            r#"INSERT INTO "click" VALUES ($1, $2, $3)"#
        );
    }

    #[test]
    fn binds_in_column_order_with_coercions() {
        let table = click_table();
        let record = json_record(r#"{"ok":true,"type":"click","y":4,"x":3}"#);
        assert_eq!(
            table.bind_args(&record).unwrap(),
            vec![
                SqlValue::Integer(Some(3)),
                SqlValue::Float(Some(4.0)),
                SqlValue::Integer(Some(1)),
            ]
        );
    }

    #[test]
    fn absent_values_bind_as_typed_nulls() {
        let table = click_table();
        let record = json_record(r#"{"type":"click","x":null}"#);
        assert_eq!(
            table.bind_args(&record).unwrap(),
            vec![
                SqlValue::Integer(None),
                SqlValue::Float(None),
                SqlValue::Integer(None),
            ]
        );
    }

    #[test]
    fn not_null_and_mismatch_are_rejected() {
        let mut table = click_table();
        table.columns[1].not_null = true;
        let missing = json_record(r#"{"type":"click","x":1}"#);
        assert!(matches!(
            table.bind_args(&missing),
            Err(InsertError::NotNull { column, .. }) if column == "y"
        ));

        let wrong = json_record(r#"{"type":"click","x":"one","y":1.0}"#);
        assert!(matches!(
            table.bind_args(&wrong),
            Err(InsertError::TypeMismatch { column, found: "text", .. }) if column == "x"
        ));
    }

    #[test]
    fn reads_definitions_and_defaults_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "click": {{"columns": [{{"name": "x", "type": "integer", "notNull": true}}]}},
                "noise": {{"name": "noise_rows", "columns": [], "ignore": true}}
            }}"#
        )
        .unwrap();

        let tables = TableDefinitions::read_file(file.path()).unwrap();
        assert_eq!(tables.len(), 2);
        let click = tables.get("click").unwrap();
        assert_eq!(click.name, "click");
        assert!(click.columns[0].not_null);
        assert!(!click.ignore);
        let noise = tables.get("noise").unwrap();
        assert_eq!(noise.name, "noise_rows");
        assert!(noise.ignore);
    }

    #[test]
    fn rejects_unknown_column_type_and_oversized_documents() {
        assert!(matches!(
            TableDefinitions::from_slice(br#"{"t":{"columns":[{"name":"a","type":"blob"}]}}"#),
            Err(SchemaError::Parse(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b' '; MAX_DEFINITIONS_BYTES + 1]).unwrap();
        assert!(matches!(
            TableDefinitions::read_file(file.path()),
            Err(SchemaError::TooLarge { .. })
        ));
    }

    #[test]
    fn prepare_skips_ignored_tables() {
        let mut tables = TableDefinitions::new();
        tables.insert("click", click_table());
        let mut ignored = TableDefinition::new("noise", vec![]);
        ignored.ignore = true;
        tables.insert("noise", ignored);

        tables.prepare(Dialect::Sqlite);
        assert!(tables.get("click").unwrap().insert_sql().is_some());
        assert!(tables.get("noise").unwrap().insert_sql().is_none());
    }

    #[test]
    fn export_is_indented_and_sorted() {
        let mut tables = TableDefinitions::new();
        tables.insert("zeta", TableDefinition::new("zeta", vec![]));
        tables.insert("alpha", TableDefinition::new("alpha", vec![]));
        let text = String::from_utf8(tables.to_json_pretty().unwrap()).unwrap();
        assert!(text.find("\"alpha\"").unwrap() < text.find("\"zeta\"").unwrap());
        assert!(text.contains("\n    \"alpha\": {\n        \"name\": \"alpha\","));
        assert_eq!(TableDefinitions::from_slice(text.as_bytes()).unwrap(), tables);
    }
}
