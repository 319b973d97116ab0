//! Protobuf schema of the binary record and its frame header.
//!
//! Field numbers follow the Heka `message.proto` definition so that records
//! produced by existing Heka encoders decode unchanged.

use crate::record::{Column, KeyedRecord, Record, Value};

/// Name of the column synthesized from the record timestamp.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Clone, PartialEq, prost::Message)]
pub struct Header {
    #[prost(uint32, required, tag = "1")]
    pub message_length: u32,
    #[prost(int32, optional, tag = "3")]
    pub hmac_hash_function: Option<i32>,
    #[prost(string, optional, tag = "4")]
    pub hmac_signer: Option<String>,
    #[prost(uint32, optional, tag = "5")]
    pub hmac_key_version: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub hmac: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    String = 0,
    Bytes = 1,
    Integer = 2,
    Double = 3,
    Bool = 4,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Field {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(enumeration = "ValueType", optional, tag = "2")]
    pub value_type: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub representation: Option<String>,
    #[prost(string, repeated, tag = "4")]
    pub value_string: Vec<String>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub value_bytes: Vec<Vec<u8>>,
    #[prost(int64, repeated, packed = "true", tag = "6")]
    pub value_integer: Vec<i64>,
    #[prost(double, repeated, packed = "true", tag = "7")]
    pub value_double: Vec<f64>,
    #[prost(bool, repeated, packed = "true", tag = "8")]
    pub value_bool: Vec<bool>,
}

impl Field {
    /// The field's value, present only when it holds exactly one value of
    /// its declared kind.
    pub fn single_value(&self) -> Option<Value> {
        let kind = ValueType::try_from(self.value_type.unwrap_or_default()).ok()?;
        match kind {
            ValueType::String => single(&self.value_string).map(|s| Value::Text(s.clone())),
            ValueType::Bytes => single(&self.value_bytes)
                .and_then(|b| std::str::from_utf8(b).ok())
                .map(|s| Value::Text(s.to_string())),
            ValueType::Integer => single(&self.value_integer).map(|i| Value::Integer(*i)),
            ValueType::Double => single(&self.value_double).map(|x| Value::Float(*x)),
            ValueType::Bool => single(&self.value_bool).map(|b| Value::Boolean(*b)),
        }
    }
}

fn single<T>(values: &[T]) -> Option<&T> {
    match values {
        [one] => Some(one),
        _ => None,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
    /// Nanoseconds since the Unix epoch.
    #[prost(int64, required, tag = "2")]
    pub timestamp: i64,
    #[prost(string, optional, tag = "3")]
    pub r#type: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub logger: Option<String>,
    #[prost(int32, optional, tag = "5")]
    pub severity: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub payload: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub env_version: Option<String>,
    #[prost(int32, optional, tag = "8")]
    pub pid: Option<i32>,
    #[prost(string, optional, tag = "9")]
    pub hostname: Option<String>,
    #[prost(message, repeated, tag = "10")]
    pub fields: Vec<Field>,
}

impl Message {
    /// Keyed view: one column per field in field order, then the timestamp
    /// truncated to whole seconds.
    pub fn into_record(self) -> Record {
        let timestamp = self.timestamp.div_euclid(NANOS_PER_SECOND);
        let mut columns: Vec<Column> = self
            .fields
            .iter()
            .map(|field| Column {
                name: field.name.clone(),
                value: field.single_value(),
            })
            .collect();
        columns.push(Column {
            name: TIMESTAMP_COLUMN.to_string(),
            value: Some(Value::Integer(timestamp)),
        });
        Record::Keyed(KeyedRecord {
            record_type: self.r#type,
            columns,
        })
    }
}

impl From<Message> for Record {
    fn from(message: Message) -> Self {
        message.into_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value_type: ValueType) -> Field {
        Field {
            name: name.to_string(),
            value_type: Some(value_type as i32),
            ..Default::default()
        }
    }

    #[test]
    fn keyed_view_appends_timestamp_seconds() {
        let mut count = field("count", ValueType::Integer);
        count.value_integer = vec![5];
        let mut ratio = field("ratio", ValueType::Double);
        ratio.value_double = vec![0.25];
        let message = Message {
            r#type: Some("metric".into()),
            timestamp: 1_400_000_000_999_999_999,
            fields: vec![count, ratio],
            ..Default::default()
        };

        let Record::Keyed(record) = message.into_record() else {
            panic!("expected keyed record");
        };
        assert_eq!(record.record_type.as_deref(), Some("metric"));
        assert_eq!(record.num_columns(), 3);
        assert_eq!(record.columns[0].value, Some(Value::Integer(5)));
        assert_eq!(record.columns[1].value, Some(Value::Float(0.25)));
        assert_eq!(record.columns[2].name, TIMESTAMP_COLUMN);
        assert_eq!(record.columns[2].value, Some(Value::Integer(1_400_000_000)));
    }

    #[test]
    fn multi_valued_and_mismatched_fields_are_absent() {
        let mut multi = field("tags", ValueType::String);
        multi.value_string = vec!["a".into(), "b".into()];
        assert_eq!(multi.single_value(), None);

        let mut wrong_kind = field("n", ValueType::Integer);
        wrong_kind.value_string = vec!["1".into()];
        assert_eq!(wrong_kind.single_value(), None);

        let mut bytes = field("raw", ValueType::Bytes);
        bytes.value_bytes = vec![b"hello".to_vec()];
        assert_eq!(bytes.single_value(), Some(Value::Text("hello".into())));

        let mut defaulted = field("s", ValueType::String);
        defaulted.value_type = None;
        defaulted.value_string = vec!["x".into()];
        assert_eq!(defaulted.single_value(), Some(Value::Text("x".into())));
    }

    #[test]
    fn negative_timestamps_round_down() {
        let message = Message {
            timestamp: -1,
            ..Default::default()
        };
        let record = message.into_record();
        assert_eq!(record.value(TIMESTAMP_COLUMN), Some(Value::Integer(-1)));
    }
}
