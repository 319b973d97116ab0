use row_events::Record;

use crate::error::{SchemaError, ShapeError};
use crate::tabledef::{ColumnDefinition, ColumnType, TableDefinition, TableDefinitions};

/// Infers table definitions from observed records.
///
/// The first record of each type fixes that type's layout. Later records of
/// the same type are accepted but do not refine it: columns seen only in
/// later records are not added and types are not widened.
#[derive(Debug, Default)]
pub struct TableShaper {
    tables: TableDefinitions,
}

impl TableShaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &Record) -> Result<(), ShapeError> {
        let Some(record_type) = record.record_type() else {
            return Err(ShapeError::MissingType {
                record: record.to_string(),
            });
        };
        if self.tables.contains(record_type) {
            return Ok(());
        }
        let table = table_from_record(record_type, record)?;
        self.tables.insert(record_type, table);
        Ok(())
    }

    pub fn tables(&self) -> &TableDefinitions {
        &self.tables
    }

    /// Serialized definitions, in the format read back by write mode.
    pub fn export(&self) -> Result<Vec<u8>, SchemaError> {
        self.tables.to_json_pretty()
    }
}

fn table_from_record(record_type: &str, record: &Record) -> Result<TableDefinition, ShapeError> {
    let columns = record
        .columns()
        .into_iter()
        .map(|column| {
            let column_type = column.value.as_ref().map(ColumnType::of).ok_or_else(|| {
                ShapeError::UnknownColumnType {
                    table: record_type.to_string(),
                    column: column.name.clone(),
                }
            })?;
            Ok(ColumnDefinition::new(column.name, column_type))
        })
        .collect::<Result<Vec<_>, ShapeError>>()?;
    Ok(TableDefinition::new(record_type, columns))
}
