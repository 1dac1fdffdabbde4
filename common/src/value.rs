//! Value types shared by the protocol clients, the trigger evaluator,
//! and the storage writer: the typed columns a reading converts into,
//! kept in `common` so no crate needs to depend on another's client
//! just to describe a reading.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `SchemaField.field_type` / `FieldMapping.data_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
        };
        write!(f, "{s}")
    }
}

/// `FieldMapping.byte_order`: the permutation of the four bytes
/// of a 32-bit float across two 16-bit Modbus registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Abcd,
    Dcba,
    Badc,
    Cdab,
}

/// `Device.protocol` / `FieldMapping.protocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Modbus,
    Opcua,
}

/// A single decoded reading. `Timestamp` only ever appears under the
/// `timestamp_utc` key of a [`Row`]; protocol clients never produce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Int(_) | FieldValue::Float(_))
    }
}

/// One row destined for the storage writer: an ordered column→value map
/// that always carries `timestamp_utc` by the time it reaches storage.
pub type Row = BTreeMap<String, FieldValue>;

pub const TIMESTAMP_COLUMN: &str = "timestamp_utc";

/// Stamps `timestamp_utc` onto a row if it isn't already present, so
/// every row written to the target database carries one.
pub fn stamp_timestamp(row: &mut Row, now: DateTime<Utc>) {
    row.entry(TIMESTAMP_COLUMN.to_string())
        .or_insert(FieldValue::Timestamp(now));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_only_fills_missing_timestamp() {
        let mut row: Row = BTreeMap::new();
        row.insert("power".to_string(), FieldValue::Float(1.0));
        let t0 = Utc::now();
        stamp_timestamp(&mut row, t0);
        assert_eq!(row.get(TIMESTAMP_COLUMN), Some(&FieldValue::Timestamp(t0)));

        let t1 = t0 + chrono::Duration::seconds(5);
        stamp_timestamp(&mut row, t1);
        assert_eq!(row.get(TIMESTAMP_COLUMN), Some(&FieldValue::Timestamp(t0)));
    }
}
