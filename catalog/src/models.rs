//! The catalog data model, as plain serde-friendly structs. The catalog
//! store itself is out of scope; these are the shapes a real
//! catalog implementation of [`crate::gateway::CatalogGateway`] would
//! persist and the in-memory stub keeps in memory.

use chrono::{DateTime, Utc};
use common::ids::{DeviceId, DeviceTableId, JobId, JobRunId, SchemaId, StorageTargetId};
use common::value::{ByteOrder, DataType, Protocol};
use serde::{Deserialize, Serialize};
use storage::Provider;
use trigger::Operator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: SchemaId,
    pub name: String,
    pub description: String,
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub key: String,
    pub field_type: DataType,
    pub unit: Option<String>,
    pub scale: f64,
    pub description: Option<String>,
}

impl Default for SchemaField {
    fn default() -> Self {
        Self {
            key: String::new(),
            field_type: DataType::Float,
            unit: None,
            scale: 1.0,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Unknown,
    Reachable,
    Unreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageTarget {
    pub id: StorageTargetId,
    pub name: String,
    pub provider: Provider,
    pub connection_string: String,
    pub is_default: bool,
    pub status: TargetStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 502,
            unit_id: 1,
            timeout_ms: 3000,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    Anonymous,
    UserPassword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcuaConfig {
    pub endpoint: String,
    pub auth_type: AuthType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security_policy: Option<String>,
    pub security_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolConfig {
    Modbus(ModbusConfig),
    Opcua(OpcuaConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Disconnected,
    Connected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub protocol: Protocol,
    pub status: DeviceStatus,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub auto_reconnect: bool,
    pub config: ProtocolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field_key: String,
    pub protocol: Protocol,
    pub address: String,
    pub data_type: DataType,
    pub scale: f64,
    pub deadband: f64,
    pub byte_order: ByteOrder,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTableStatus {
    Pending,
    Migrated,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingHealth {
    Unmapped,
    Partial,
    Mapped,
}

/// Recomputes `mapping_health`: `mapped` iff the mapped field
/// keys cover every schema key; `partial` iff non-empty and
/// incomplete; `unmapped` iff empty or the schema itself is empty.
pub fn compute_mapping_health(schema: &Schema, mappings: &[FieldMapping]) -> MappingHealth {
    if schema.fields.is_empty() || mappings.is_empty() {
        return MappingHealth::Unmapped;
    }
    let mapped_keys: std::collections::HashSet<&str> = mappings.iter().map(|m| m.field_key.as_str()).collect();
    let schema_keys: std::collections::HashSet<&str> = schema.fields.iter().map(|f| f.key.as_str()).collect();

    if schema_keys.is_subset(&mapped_keys) {
        MappingHealth::Mapped
    } else {
        MappingHealth::Partial
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTable {
    pub id: DeviceTableId,
    pub name: String,
    pub schema_id: SchemaId,
    pub storage_target_id: StorageTargetId,
    pub device_id: Option<DeviceId>,
    pub status: DeviceTableStatus,
    pub mapping_health: MappingHealth,
    pub last_migrated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub mappings: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    Continuous,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTrigger {
    pub field: String,
    pub operator: Operator,
    pub value: Option<f64>,
    pub deadband: f64,
    pub cooldown_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub job_type: JobType,
    pub tables: Vec<DeviceTableId>,
    pub interval_ms: u64,
    pub enabled: bool,
    pub status: JobStatus,
    pub batch_size: usize,
    pub triggers: Vec<(DeviceTableId, JobTrigger)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: JobRunId,
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub rows_written: u64,
    pub reads_count: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub avg_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<u64>,
    pub error_log: Vec<metrics::ErrorEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(keys: &[&str]) -> Schema {
        Schema {
            id: SchemaId::new(),
            name: "s".to_string(),
            description: String::new(),
            fields: keys
                .iter()
                .map(|k| SchemaField {
                    key: k.to_string(),
                    ..SchemaField::default()
                })
                .collect(),
        }
    }

    fn mapping(key: &str) -> FieldMapping {
        FieldMapping {
            field_key: key.to_string(),
            protocol: Protocol::Modbus,
            address: "40001".to_string(),
            data_type: DataType::Float,
            scale: 1.0,
            deadband: 0.0,
            byte_order: ByteOrder::Abcd,
            poll_interval_ms: None,
        }
    }

    #[test]
    fn empty_mappings_is_unmapped() {
        let schema = schema(&["power"]);
        assert_eq!(compute_mapping_health(&schema, &[]), MappingHealth::Unmapped);
    }

    #[test]
    fn partial_coverage_is_partial() {
        let schema = schema(&["power", "voltage"]);
        let mappings = vec![mapping("power")];
        assert_eq!(compute_mapping_health(&schema, &mappings), MappingHealth::Partial);
    }

    #[test]
    fn full_coverage_is_mapped() {
        let schema = schema(&["power", "voltage"]);
        let mappings = vec![mapping("power"), mapping("voltage")];
        assert_eq!(compute_mapping_health(&schema, &mappings), MappingHealth::Mapped);
    }

    #[test]
    fn empty_schema_is_unmapped() {
        let schema = schema(&[]);
        let mappings = vec![mapping("power")];
        assert_eq!(compute_mapping_health(&schema, &mappings), MappingHealth::Unmapped);
    }
}
