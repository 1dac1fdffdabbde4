//! Connection pool keyed by `(host, port)`. A `DashMap` of per-key
//! `tokio::sync::Mutex`s, rather than one global lock, so concurrent
//! readers of *different* devices never block each other while
//! readers of the *same* `(host, port)` still serialize.

use std::sync::Arc;

use common::error::CResult;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connection::ModbusConnection;

pub type PoolKey = (String, u16);

#[derive(Default)]
pub struct ModbusPool {
    clients: DashMap<PoolKey, Arc<Mutex<ModbusConnection>>>,
}

impl ModbusPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled connection for `(host, port)`, opening a new
    /// one if absent. The caller holds the returned mutex for the
    /// duration of one request/response round trip.
    pub async fn get_or_connect(&self, host: &str, port: u16, timeout_ms: u64) -> CResult<Arc<Mutex<ModbusConnection>>> {
        let key = (host.to_string(), port);
        if let Some(existing) = self.clients.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let conn = ModbusConnection::connect(host, port, timeout_ms).await?;
        let handle = Arc::new(Mutex::new(conn));
        self.clients.insert(key, Arc::clone(&handle));
        info!(host, port, "modbus connected");
        Ok(handle)
    }

    /// Evicts a client after an I/O failure so the next call reconnects.
    pub fn evict(&self, host: &str, port: u16) {
        let key = (host.to_string(), port);
        if self.clients.remove(&key).is_some() {
            warn!(host, port, "modbus client evicted after transport error");
        }
    }
}
