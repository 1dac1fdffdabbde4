//! In-memory catalog state: a
//! `tokio::sync::RwLock`-guarded set of maps, good enough for tests and
//! the demo CLI. A production deployment swaps this for its own
//! [`crate::gateway::CatalogGateway`] implementation against the real
//! store without the engine crates changing.

use std::collections::HashMap;

use common::ids::{DeviceId, DeviceTableId, JobId, JobRunId, SchemaId, StorageTargetId};
use tokio::sync::RwLock;

use crate::models::{Device, DeviceTable, Job, JobRun, Schema, StorageTarget};

#[derive(Default)]
pub struct CatalogData {
    pub schemas: HashMap<SchemaId, Schema>,
    pub storage_targets: HashMap<StorageTargetId, StorageTarget>,
    pub devices: HashMap<DeviceId, Device>,
    pub device_tables: HashMap<DeviceTableId, DeviceTable>,
    pub jobs: HashMap<JobId, Job>,
    pub job_runs: HashMap<JobRunId, JobRun>,
    pub open_runs: HashMap<JobId, JobRunId>,
}

pub struct InMemoryCatalog {
    pub(crate) data: RwLock<CatalogData>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(CatalogData::default()),
        }
    }

    pub async fn insert_schema(&self, schema: Schema) {
        self.data.write().await.schemas.insert(schema.id, schema);
    }

    pub async fn insert_storage_target(&self, target: StorageTarget) {
        self.data.write().await.storage_targets.insert(target.id, target);
    }

    pub async fn insert_device(&self, device: Device) {
        self.data.write().await.devices.insert(device.id, device);
    }

    pub async fn insert_device_table(&self, table: DeviceTable) {
        self.data.write().await.device_tables.insert(table.id, table);
    }

    pub async fn insert_job(&self, job: Job) {
        self.data.write().await.jobs.insert(job.id, job);
    }

    pub async fn get_job_run(&self, run_id: JobRunId) -> Option<JobRun> {
        self.data.read().await.job_runs.get(&run_id).cloned()
    }
}
