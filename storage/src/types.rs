use common::value::DataType;
use serde::{Deserialize, Serialize};

/// `StorageTarget.provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Sqlite,
    Postgres,
    MySql,
    Mssql,
}

impl Provider {
    /// Postgres and SQL Server get a real schema; SQLite and MySQL are
    /// schema-less and use an underscore-prefixed name.
    pub fn has_native_schema(&self) -> bool {
        matches!(self, Provider::Postgres | Provider::Mssql)
    }
}

/// One column of a physical table, derived from a `SchemaField`.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: String,
    pub field_type: DataType,
}

/// Type mapping: `bool->BOOLEAN`, `int->INTEGER`, `float->FLOAT`,
/// `string->VARCHAR(255)`; unknown types default to `FLOAT`.
pub fn sql_type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Bool => "BOOLEAN",
        DataType::Int => "INTEGER",
        DataType::Float => "FLOAT",
        DataType::String => "VARCHAR(255)",
    }
}
