//! Process-wide configuration, loaded once at agent start: a single
//! `toml`-backed struct with per-concern sub-structs and `Default`
//! impls so the process has sane values with no file present.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CResult, EngineError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base: BaseConfig,
    pub protocol: ProtocolConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Directory for the non-blocking file log appender; stdout-only when absent.
    pub log_dir: Option<String>,
    /// Logical namespace every managed table lives under.
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Default Modbus/OPC UA I/O timeout when a device doesn't override it.
    pub default_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub pool_size: u32,
    pub max_overflow: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub latency_window: usize,
    pub error_log_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base: BaseConfig::default(),
            protocol: ProtocolConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig {
            log_dir: None,
            namespace: "neuract".to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            default_timeout_ms: 3000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            pool_size: 5,
            max_overflow: 10,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            latency_window: 1000,
            error_log_cap: 100,
        }
    }
}

/// Reads a TOML config file, falling back to defaults for absent fields.
pub fn read_config<P: AsRef<Path>>(path: P) -> CResult<EngineConfig> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| EngineError::config(format!("reading config file: {e}")))?;
    toml::from_str(&text).map_err(|e| EngineError::config(format!("parsing config file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.base.namespace, "neuract");
        assert_eq!(cfg.protocol.default_timeout_ms, 3000);
        assert_eq!(cfg.storage.pool_size, 5);
        assert_eq!(cfg.storage.max_overflow, 10);
        assert_eq!(cfg.metrics.latency_window, 1000);
        assert_eq!(cfg.metrics.error_log_cap, 100);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = read_config("/nonexistent/path.toml").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
