//! Engine pool keyed by `(provider, connection_string)`, mirroring
//! [`modbus::pool::ModbusPool`]'s dashmap-of-handles shape.

use std::sync::Arc;

use common::error::CResult;
use dashmap::DashMap;
use tracing::info;

use crate::engine::StorageEngine;
use crate::sqlx_engine::SqlxEngine;
use crate::tiberius_engine::TiberiusEngine;
use crate::types::Provider;

pub type PoolKey = (Provider, String);

#[derive(Default)]
pub struct EnginePool {
    engines: DashMap<PoolKey, Arc<dyn StorageEngine>>,
}

impl EnginePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled engine for `(provider, connection_string)`,
    /// connecting a new one if absent. A stale handle is pinged first
    /// and disposed on failure so the caller always gets a live engine.
    pub async fn get_or_connect(
        &self,
        provider: Provider,
        connection_string: &str,
        namespace: &str,
    ) -> CResult<Arc<dyn StorageEngine>> {
        let key = (provider, connection_string.to_string());

        if let Some(existing) = self.engines.get(&key) {
            let engine = Arc::clone(existing.value());
            drop(existing);
            if engine.ping().await.is_ok() {
                return Ok(engine);
            }
            self.engines.remove(&key);
        }

        let engine: Arc<dyn StorageEngine> = match provider {
            Provider::Mssql => Arc::new(TiberiusEngine::connect(connection_string, namespace).await?),
            _ => Arc::new(SqlxEngine::connect(provider, connection_string, namespace).await?),
        };

        self.engines.insert(key, Arc::clone(&engine));
        info!(?provider, "storage target connected");
        Ok(engine)
    }
}
