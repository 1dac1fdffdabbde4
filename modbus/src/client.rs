//! Typed reads and the test-connection operation,
//! built on the pool and wire codec.

use std::time::Instant;

use common::error::{CResult, EngineError};
use common::value::{ByteOrder, DataType, FieldValue};

use crate::address::{parse_address, RegisterKind};
use crate::codec::{registers_to_float, registers_to_string, to_signed_int};
use crate::pool::ModbusPool;

#[derive(Debug, Clone, Copy)]
pub struct ReadParams {
    pub address: u32,
    pub data_type: DataType,
    pub unit_id: u8,
    pub byte_order: ByteOrder,
    pub scale: f64,
}

pub struct ModbusClient {
    pool: ModbusPool,
}

impl Default for ModbusClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusClient {
    pub fn new() -> Self {
        ModbusClient {
            pool: ModbusPool::new(),
        }
    }

    /// Reads and converts a value to its configured type. Evicts the pooled
    /// connection and surfaces `TransportError` on any I/O failure.
    pub async fn read_value(&self, host: &str, port: u16, timeout_ms: u64, params: ReadParams) -> CResult<FieldValue> {
        let (kind, offset) = parse_address(params.address);

        let count = match params.data_type {
            DataType::String => 16,
            DataType::Float => 2,
            DataType::Bool | DataType::Int => 1,
        };

        let registers_or_bits = self
            .read_raw(host, port, timeout_ms, kind, offset, count, params.unit_id)
            .await;

        let (registers, bits) = match registers_or_bits {
            Ok(v) => v,
            Err(e) => {
                self.pool.evict(host, port);
                return Err(e);
            }
        };

        let value = match params.data_type {
            DataType::Bool => {
                if matches!(kind, RegisterKind::Coil | RegisterKind::Discrete) {
                    FieldValue::Bool(*bits.first().unwrap_or(&false))
                } else {
                    FieldValue::Bool(*registers.first().unwrap_or(&0) != 0)
                }
            }
            DataType::Int => {
                let raw = to_signed_int(*registers.first().unwrap_or(&0));
                FieldValue::Int((raw as f64 * params.scale) as i64)
            }
            DataType::Float => {
                if registers.len() < 2 {
                    return Err(EngineError::decode("expected two registers for float decode"));
                }
                let decoded = registers_to_float(registers[0], registers[1], params.byte_order);
                FieldValue::Float(decoded as f64 * params.scale)
            }
            DataType::String => FieldValue::String(registers_to_string(&registers)),
        };

        Ok(value)
    }

    async fn read_raw(
        &self,
        host: &str,
        port: u16,
        timeout_ms: u64,
        kind: RegisterKind,
        offset: u16,
        count: u16,
        unit_id: u8,
    ) -> CResult<(Vec<u16>, Vec<bool>)> {
        let handle = self.pool.get_or_connect(host, port, timeout_ms).await?;
        let mut conn = handle.lock().await;
        let resp = conn
            .read(kind.read_function_code(), unit_id, offset, count)
            .await?;
        Ok((resp.registers, resp.bits))
    }

    /// A holding-read of one register at offset 0, using the caller's
    /// `timeout_ms` for both connect and read.
    pub async fn test_connection(&self, host: &str, port: u16, unit_id: u8, timeout_ms: u64) -> (bool, u64, String) {
        let start = Instant::now();
        let result = self
            .read_raw(host, port, timeout_ms, RegisterKind::Holding, 0, 1, unit_id)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => (true, latency_ms, String::new()),
            Err(e) => {
                self.pool.evict(host, port);
                (false, latency_ms, e.to_string())
            }
        }
    }
}
