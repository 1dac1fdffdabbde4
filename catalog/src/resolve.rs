//! Resolves catalog records into protocol-call parameters: the
//! work happens once at snapshot build time so a malformed mapping
//! surfaces as `ConfigError` before the worker ever starts, rather than
//! failing silently mid-run.

use common::error::{CResult, EngineError};
use common::value::{ByteOrder, DataType};
use opcua_gateway::auth::{AuthType as OpcuaAuthType, Credentials};

use crate::models::{AuthType, Device, DeviceTable, FieldMapping, ProtocolConfig};

#[derive(Debug, Clone)]
pub enum ResolvedField {
    Modbus {
        host: String,
        port: u16,
        unit_id: u8,
        timeout_ms: u64,
        field_key: String,
        address: u32,
        data_type: DataType,
        byte_order: ByteOrder,
        scale: f64,
    },
    Opcua {
        endpoint: String,
        node_id: String,
        field_key: String,
        scale: f64,
        credentials: Credentials,
    },
}

impl ResolvedField {
    pub fn field_key(&self) -> &str {
        match self {
            ResolvedField::Modbus { field_key, .. } => field_key,
            ResolvedField::Opcua { field_key, .. } => field_key,
        }
    }
}

/// Resolves every [`FieldMapping`] on `table` against its bound
/// [`Device`], failing the whole table with `ConfigError` if a mapping
/// names a protocol the device doesn't speak or the device is absent.
pub fn resolve_table_reads(table: &DeviceTable, device: Option<&Device>) -> CResult<Vec<ResolvedField>> {
    table.mappings.iter().map(|mapping| resolve_one(mapping, device, &table.name)).collect()
}

fn resolve_one(mapping: &FieldMapping, device: Option<&Device>, table_name: &str) -> CResult<ResolvedField> {
    let device = device.ok_or_else(|| {
        EngineError::config(format!(
            "table {table_name} has field mapping '{}' but no bound device",
            mapping.field_key
        ))
    })?;

    match &device.config {
        ProtocolConfig::Modbus(cfg) => {
            let address: u32 = mapping
                .address
                .parse()
                .map_err(|_| EngineError::config(format!("malformed modbus address '{}'", mapping.address)))?;
            Ok(ResolvedField::Modbus {
                host: cfg.host.clone(),
                port: cfg.port,
                unit_id: cfg.unit_id,
                timeout_ms: cfg.timeout_ms,
                field_key: mapping.field_key.clone(),
                address,
                data_type: mapping.data_type,
                byte_order: mapping.byte_order,
                scale: mapping.scale,
            })
        }
        ProtocolConfig::Opcua(cfg) => Ok(ResolvedField::Opcua {
            endpoint: cfg.endpoint.clone(),
            node_id: mapping.address.clone(),
            field_key: mapping.field_key.clone(),
            scale: mapping.scale,
            credentials: to_credentials(cfg),
        }),
    }
}

fn to_credentials(cfg: &crate::models::OpcuaConfig) -> Credentials {
    let auth_type = match cfg.auth_type {
        AuthType::Anonymous => OpcuaAuthType::Anonymous,
        AuthType::UserPassword => OpcuaAuthType::UserPassword,
    };
    Credentials {
        auth_type: Some(auth_type),
        username: cfg.username.clone(),
        password: cfg.password.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use common::ids::{DeviceId, DeviceTableId, SchemaId, StorageTargetId};
    use common::value::Protocol;

    fn modbus_device() -> Device {
        Device {
            id: DeviceId::new(),
            name: "plc-1".to_string(),
            protocol: Protocol::Modbus,
            status: DeviceStatus::Connected,
            latency_ms: None,
            last_error: None,
            auto_reconnect: true,
            config: ProtocolConfig::Modbus(ModbusConfig {
                host: "10.0.0.5".to_string(),
                ..ModbusConfig::default()
            }),
        }
    }

    fn table_with(mappings: Vec<FieldMapping>) -> DeviceTable {
        DeviceTable {
            id: DeviceTableId::new(),
            name: "lt_panel".to_string(),
            schema_id: SchemaId::new(),
            storage_target_id: StorageTargetId::new(),
            device_id: None,
            status: DeviceTableStatus::Pending,
            mapping_health: MappingHealth::Mapped,
            last_migrated_at: None,
            last_error: None,
            mappings,
        }
    }

    #[test]
    fn resolves_modbus_address() {
        let mapping = FieldMapping {
            field_key: "power".to_string(),
            protocol: Protocol::Modbus,
            address: "40001".to_string(),
            data_type: DataType::Float,
            scale: 1.0,
            deadband: 0.0,
            byte_order: ByteOrder::Abcd,
            poll_interval_ms: None,
        };
        let table = table_with(vec![mapping]);
        let device = modbus_device();

        let resolved = resolve_table_reads(&table, Some(&device)).unwrap();
        assert_eq!(resolved.len(), 1);
        match &resolved[0] {
            ResolvedField::Modbus { address, host, .. } => {
                assert_eq!(*address, 40001);
                assert_eq!(host, "10.0.0.5");
            }
            _ => panic!("expected modbus"),
        }
    }

    #[test]
    fn missing_device_is_config_error() {
        let mapping = FieldMapping {
            field_key: "power".to_string(),
            protocol: Protocol::Modbus,
            address: "40001".to_string(),
            data_type: DataType::Float,
            scale: 1.0,
            deadband: 0.0,
            byte_order: ByteOrder::Abcd,
            poll_interval_ms: None,
        };
        let table = table_with(vec![mapping]);

        let err = resolve_table_reads(&table, None).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn malformed_address_is_config_error() {
        let mapping = FieldMapping {
            field_key: "power".to_string(),
            protocol: Protocol::Modbus,
            address: "not-a-number".to_string(),
            data_type: DataType::Float,
            scale: 1.0,
            deadband: 0.0,
            byte_order: ByteOrder::Abcd,
            poll_interval_ms: None,
        };
        let table = table_with(vec![mapping]);
        let device = modbus_device();

        let err = resolve_table_reads(&table, Some(&device)).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
