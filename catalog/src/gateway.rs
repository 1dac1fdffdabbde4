//! `CatalogGateway`: translates
//! catalog records into the executor's immutable job snapshot and
//! records job lifecycle history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::error::{CResult, EngineError};
use common::ids::{DeviceTableId, JobId, JobRunId};
use common::value::{FieldValue, Row};
use executor::{JobSnapshot, JobType as ExecJobType, ReadFn, WriteFn};
use metrics::JobMetricsSummary;
use modbus::{ModbusClient, ReadParams};
use opcua_gateway::OpcuaClient;
use storage::{ColumnDef, EnginePool};
use tracing::warn;
use trigger::TriggerDef;

use crate::models::{JobType, MappingHealth};
use crate::resolve::{resolve_table_reads, ResolvedField};
use crate::store::InMemoryCatalog;

const NAMESPACE: &str = "neuract";

#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn load_job_snapshot(&self, job_id: JobId) -> CResult<JobSnapshot>;
    async fn record_job_started(&self, job_id: JobId) -> CResult<JobRunId>;
    async fn record_job_finished(&self, job_id: JobId, run_id: JobRunId, summary: JobMetricsSummary) -> CResult<()>;
    async fn migrate_table(&self, device_table_id: DeviceTableId) -> CResult<()>;
}

/// Bundles the catalog store with the protocol/storage handles needed
/// to build callbacks, one instance per process, bundled inside the
/// root `Engine` handle.
pub struct CatalogEngine {
    pub catalog: InMemoryCatalog,
    modbus: Arc<ModbusClient>,
    opcua: Arc<OpcuaClient>,
    storage: Arc<EnginePool>,
}

impl Default for CatalogEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogEngine {
    pub fn new() -> Self {
        Self {
            catalog: InMemoryCatalog::new(),
            modbus: Arc::new(ModbusClient::new()),
            opcua: Arc::new(OpcuaClient::new()),
            storage: Arc::new(EnginePool::new()),
        }
    }
}

#[async_trait]
impl CatalogGateway for CatalogEngine {
    async fn load_job_snapshot(&self, job_id: JobId) -> CResult<JobSnapshot> {
        let data = self.catalog.data.read().await;
        let job = data.jobs.get(&job_id).ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?.clone();

        if !job.enabled {
            return Err(EngineError::Conflict(format!("job {job_id} is disabled")));
        }

        if matches!(job.job_type, JobType::Trigger) && job.triggers.is_empty() {
            return Err(EngineError::config(format!("trigger job {job_id} has no triggers configured")));
        }

        let mut triggers: HashMap<DeviceTableId, Vec<TriggerDef>> = HashMap::new();
        for (table_id, t) in &job.triggers {
            triggers.entry(*table_id).or_default().push(TriggerDef {
                field: t.field.clone(),
                operator: t.operator,
                threshold: t.value.map(FieldValue::Float),
                deadband: t.deadband,
                cooldown_ms: t.cooldown_ms,
            });
        }

        let mut table_ids = Vec::with_capacity(job.tables.len());
        let mut resolved_reads: HashMap<DeviceTableId, Vec<ResolvedField>> = HashMap::new();
        let mut write_targets: HashMap<DeviceTableId, (String, storage::Provider, String)> = HashMap::new();

        for table_id in &job.tables {
            let table = data
                .device_tables
                .get(table_id)
                .ok_or_else(|| EngineError::NotFound(format!("device table {table_id}")))?;

            if matches!(table.mapping_health, MappingHealth::Unmapped) {
                return Err(EngineError::config(format!("table {} has no field mappings", table.name)));
            }

            let device = table.device_id.and_then(|id| data.devices.get(&id));
            let reads = resolve_table_reads(table, device)?;

            let target = data
                .storage_targets
                .get(&table.storage_target_id)
                .ok_or_else(|| EngineError::NotFound(format!("storage target for table {}", table.name)))?;

            table_ids.push(*table_id);
            resolved_reads.insert(*table_id, reads);
            write_targets.insert(*table_id, (table.name.clone(), target.provider, target.connection_string.clone()));
        }

        drop(data);

        let modbus = Arc::clone(&self.modbus);
        let opcua = Arc::clone(&self.opcua);
        let storage = Arc::clone(&self.storage);

        let read: ReadFn = {
            let resolved_reads = Arc::new(resolved_reads);
            let modbus = Arc::clone(&modbus);
            let opcua = Arc::clone(&opcua);
            Arc::new(move |table_id: DeviceTableId| {
                let resolved_reads = Arc::clone(&resolved_reads);
                let modbus = Arc::clone(&modbus);
                let opcua = Arc::clone(&opcua);
                Box::pin(async move { read_table(&resolved_reads, &modbus, &opcua, table_id).await })
            })
        };

        let write: WriteFn = {
            let write_targets = Arc::new(write_targets);
            Arc::new(move |table_id: DeviceTableId, rows: Vec<Row>| {
                let write_targets = Arc::clone(&write_targets);
                let storage = Arc::clone(&storage);
                Box::pin(async move { write_table(&write_targets, &storage, table_id, rows).await })
            })
        };

        Ok(JobSnapshot {
            job_id,
            job_type: match job.job_type {
                JobType::Continuous => ExecJobType::Continuous,
                JobType::Trigger => ExecJobType::Trigger,
            },
            interval_ms: job.interval_ms,
            table_ids,
            triggers,
            batch_size: job.batch_size,
            read,
            write,
        })
    }

    async fn record_job_started(&self, job_id: JobId) -> CResult<JobRunId> {
        let mut data = self.catalog.data.write().await;
        if !data.jobs.contains_key(&job_id) {
            return Err(EngineError::NotFound(format!("job {job_id}")));
        }

        let run_id = JobRunId::new();
        let run = crate::models::JobRun {
            id: run_id,
            job_id,
            started_at: common::time_util::now_utc(),
            stopped_at: None,
            duration_ms: None,
            rows_written: 0,
            reads_count: 0,
            read_errors: 0,
            write_errors: 0,
            avg_latency_ms: None,
            p95_latency_ms: None,
            error_log: vec![],
        };
        data.job_runs.insert(run_id, run);
        data.open_runs.insert(job_id, run_id);
        Ok(run_id)
    }

    async fn record_job_finished(&self, job_id: JobId, run_id: JobRunId, summary: JobMetricsSummary) -> CResult<()> {
        let mut data = self.catalog.data.write().await;
        let run = data
            .job_runs
            .get_mut(&run_id)
            .ok_or_else(|| EngineError::NotFound(format!("job run {run_id}")))?;

        let now = common::time_util::now_utc();
        run.stopped_at = Some(now);
        run.duration_ms = Some((now - run.started_at).num_milliseconds());
        run.rows_written = summary.rows_written;
        run.reads_count = summary.reads;
        run.read_errors = summary.read_errors;
        run.write_errors = summary.write_errors;
        run.avg_latency_ms = summary.avg_read_ms;
        run.p95_latency_ms = summary.p95_read_ms;
        run.error_log = summary.errors;

        data.open_runs.remove(&job_id);
        Ok(())
    }

    async fn migrate_table(&self, device_table_id: DeviceTableId) -> CResult<()> {
        let mut data = self.catalog.data.write().await;
        let table = data
            .device_tables
            .get(&device_table_id)
            .ok_or_else(|| EngineError::NotFound(format!("device table {device_table_id}")))?
            .clone();
        let schema = data
            .schemas
            .get(&table.schema_id)
            .ok_or_else(|| EngineError::NotFound(format!("schema for table {}", table.name)))?
            .clone();
        let target = data
            .storage_targets
            .get(&table.storage_target_id)
            .ok_or_else(|| EngineError::NotFound(format!("storage target for table {}", table.name)))?
            .clone();

        let columns: Vec<ColumnDef> = schema
            .fields
            .iter()
            .map(|f| ColumnDef {
                key: f.key.clone(),
                field_type: f.field_type,
            })
            .collect();

        let engine = self.storage.get_or_connect(target.provider, &target.connection_string, NAMESPACE).await?;
        let result = engine.create_table(&table.name, &columns).await;

        let table_mut = data.device_tables.get_mut(&device_table_id).unwrap();
        match result {
            Ok(()) => {
                table_mut.status = crate::models::DeviceTableStatus::Migrated;
                table_mut.last_migrated_at = Some(common::time_util::now_utc());
                table_mut.last_error = None;
                Ok(())
            }
            Err(err) => {
                table_mut.status = crate::models::DeviceTableStatus::Error;
                table_mut.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

async fn read_table(
    resolved_reads: &HashMap<DeviceTableId, Vec<ResolvedField>>,
    modbus: &ModbusClient,
    opcua: &OpcuaClient,
    table_id: DeviceTableId,
) -> CResult<Option<Row>> {
    let Some(fields) = resolved_reads.get(&table_id) else {
        return Ok(None);
    };

    let mut row: Row = Row::new();
    for field in fields {
        match field {
            ResolvedField::Modbus {
                host,
                port,
                unit_id,
                timeout_ms,
                field_key,
                address,
                data_type,
                byte_order,
                scale,
            } => {
                let params = ReadParams {
                    address: *address,
                    data_type: *data_type,
                    unit_id: *unit_id,
                    byte_order: *byte_order,
                    scale: *scale,
                };
                match modbus.read_value(host, *port, *timeout_ms, params).await {
                    Ok(value) => {
                        row.insert(field_key.clone(), value);
                    }
                    Err(err) if err.code() == "DECODE_ERROR" => {
                        warn!(field = field_key, error = %err, "decode error, emitting null");
                        row.insert(field_key.clone(), FieldValue::Null);
                    }
                    Err(err) => return Err(err),
                }
            }
            ResolvedField::Opcua {
                endpoint,
                node_id,
                field_key,
                scale,
                credentials,
            } => match opcua.read_value(endpoint, node_id, credentials, *scale).await {
                Ok(value) => {
                    row.insert(field_key.clone(), value);
                }
                Err(err) if err.code() == "DECODE_ERROR" => {
                    warn!(field = field_key, error = %err, "decode error, emitting null");
                    row.insert(field_key.clone(), FieldValue::Null);
                }
                Err(err) => return Err(err),
            },
        }
    }

    Ok(Some(row))
}

async fn write_table(
    write_targets: &HashMap<DeviceTableId, (String, storage::Provider, String)>,
    storage: &EnginePool,
    table_id: DeviceTableId,
    rows: Vec<Row>,
) -> CResult<bool> {
    let (table_name, provider, connection_string) = write_targets
        .get(&table_id)
        .ok_or_else(|| EngineError::config(format!("no storage target resolved for table {table_id}")))?;

    let engine = storage.get_or_connect(*provider, connection_string, NAMESPACE).await?;
    engine.insert_batch(table_name, &rows).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use common::ids::{DeviceId, SchemaId, StorageTargetId};
    use common::value::{DataType, Protocol};

    fn schema() -> Schema {
        Schema {
            id: SchemaId::new(),
            name: "panel".to_string(),
            description: String::new(),
            fields: vec![SchemaField {
                key: "power".to_string(),
                field_type: DataType::Float,
                ..SchemaField::default()
            }],
        }
    }

    fn storage_target(id: StorageTargetId) -> StorageTarget {
        StorageTarget {
            id,
            name: "default".to_string(),
            provider: storage::Provider::Sqlite,
            connection_string: ":memory:".to_string(),
            is_default: true,
            status: TargetStatus::Unknown,
            last_error: None,
        }
    }

    fn modbus_device(id: DeviceId) -> Device {
        Device {
            id,
            name: "plc".to_string(),
            protocol: Protocol::Modbus,
            status: DeviceStatus::Connected,
            latency_ms: None,
            last_error: None,
            auto_reconnect: true,
            config: ProtocolConfig::Modbus(ModbusConfig {
                host: "127.0.0.1".to_string(),
                ..ModbusConfig::default()
            }),
        }
    }

    #[tokio::test]
    async fn load_snapshot_rejects_unknown_job() {
        let engine = CatalogEngine::new();
        let err = engine.load_job_snapshot(JobId::new()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn load_snapshot_rejects_unmapped_table() {
        let engine = CatalogEngine::new();
        let schema = schema();
        let target_id = StorageTargetId::new();
        let device_id = DeviceId::new();

        let table = DeviceTable {
            id: DeviceTableId::new(),
            name: "lt_panel".to_string(),
            schema_id: schema.id,
            storage_target_id: target_id,
            device_id: Some(device_id),
            status: DeviceTableStatus::Pending,
            mapping_health: MappingHealth::Unmapped,
            last_migrated_at: None,
            last_error: None,
            mappings: vec![],
        };
        let job = Job {
            id: JobId::new(),
            name: "continuous".to_string(),
            job_type: JobType::Continuous,
            tables: vec![table.id],
            interval_ms: 1000,
            enabled: true,
            status: JobStatus::Stopped,
            batch_size: 1,
            triggers: vec![],
        };

        engine.catalog.insert_schema(schema).await;
        engine.catalog.insert_storage_target(storage_target(target_id)).await;
        engine.catalog.insert_device(modbus_device(device_id)).await;
        engine.catalog.insert_device_table(table).await;
        engine.catalog.insert_job(job.clone()).await;

        let err = engine.load_job_snapshot(job.id).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn load_snapshot_succeeds_for_mapped_table() {
        let engine = CatalogEngine::new();
        let schema = schema();
        let target_id = StorageTargetId::new();
        let device_id = DeviceId::new();

        let table = DeviceTable {
            id: DeviceTableId::new(),
            name: "lt_panel".to_string(),
            schema_id: schema.id,
            storage_target_id: target_id,
            device_id: Some(device_id),
            status: DeviceTableStatus::Pending,
            mapping_health: MappingHealth::Mapped,
            last_migrated_at: None,
            last_error: None,
            mappings: vec![FieldMapping {
                field_key: "power".to_string(),
                protocol: Protocol::Modbus,
                address: "40001".to_string(),
                data_type: DataType::Float,
                scale: 1.0,
                deadband: 0.0,
                byte_order: common::value::ByteOrder::Abcd,
                poll_interval_ms: None,
            }],
        };
        let job = Job {
            id: JobId::new(),
            name: "continuous".to_string(),
            job_type: JobType::Continuous,
            tables: vec![table.id],
            interval_ms: 1000,
            enabled: true,
            status: JobStatus::Stopped,
            batch_size: 1,
            triggers: vec![],
        };

        engine.catalog.insert_schema(schema).await;
        engine.catalog.insert_storage_target(storage_target(target_id)).await;
        engine.catalog.insert_device(modbus_device(device_id)).await;
        engine.catalog.insert_device_table(table).await;
        engine.catalog.insert_job(job.clone()).await;

        let snapshot = engine.load_job_snapshot(job.id).await.unwrap();
        assert_eq!(snapshot.table_ids.len(), 1);
        assert_eq!(snapshot.batch_size, 1);
    }
}
