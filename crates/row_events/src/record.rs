use std::fmt;

use serde_json::{Map, Number};

/// Name of the JSON key that carries the record type.
pub const TYPE_KEY: &str = "type";

/// A single scalar carried by a record column.
///
/// Absence is modelled as `Option<Value>` at the call sites; there is no
/// separate null variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => Some(number_value(n)),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }
}

fn number_value(n: &Number) -> Value {
    match n.as_i64() {
        Some(i) => Value::Integer(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// One positional column of a keyed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub value: Option<Value>,
}

/// Record whose columns have a fixed position (binary formats).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub record_type: Option<String>,
    pub columns: Vec<Column>,
}

impl KeyedRecord {
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

/// Record backed by a decoded JSON object.
///
/// The object keeps its key order so that the first record of a type fixes
/// the column layout in the order the producer wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub fields: Map<String, serde_json::Value>,
}

impl MappedRecord {
    pub fn new(fields: Map<String, serde_json::Value>) -> Self {
        Self { fields }
    }
}

/// A decoded unit of input, independent of the wire format it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Keyed(KeyedRecord),
    Mapped(MappedRecord),
}

impl Record {
    /// Logical record type; used as the target table name.
    pub fn record_type(&self) -> Option<&str> {
        let ty = match self {
            Record::Keyed(r) => r.record_type.as_deref(),
            Record::Mapped(r) => r.fields.get(TYPE_KEY).and_then(|v| v.as_str()),
        };
        ty.filter(|ty| !ty.is_empty())
    }

    /// Looks up a column by name. Returns `None` when the column is missing
    /// or carries no scalar value.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self {
            Record::Keyed(r) => r
                .columns
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.value.clone()),
            Record::Mapped(r) => r.fields.get(name).and_then(Value::from_json),
        }
    }

    /// Columns in layout order. For mapped records the `type` key is the
    /// table name, not a column, and is left out.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Record::Keyed(r) => r.columns.clone(),
            Record::Mapped(r) => r
                .fields
                .iter()
                .filter(|(name, _)| name.as_str() != TYPE_KEY)
                .map(|(name, value)| Column {
                    name: name.clone(),
                    value: Value::from_json(value),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.record_type().unwrap_or("<untyped>"))?;
        for (idx, column) in self.columns().iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match &column.value {
                Some(value) => write!(f, "{}={value}", column.name)?,
                None => write!(f, "{}=<absent>", column.name)?,
            }
        }
        f.write_str("}")
    }
}
