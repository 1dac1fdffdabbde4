//! The immutable job snapshot: everything a worker needs to run
//! one job, captured atomically at start so catalog edits mid-run are
//! never observed.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::error::CResult;
use common::ids::{DeviceTableId, JobId};
use common::value::Row;
use trigger::TriggerDef;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `read(table_id) -> values | null`.
pub type ReadFn = Arc<dyn Fn(DeviceTableId) -> BoxFuture<'static, CResult<Option<Row>>> + Send + Sync>;

/// `write(table_id, rows) -> bool`.
pub type WriteFn = Arc<dyn Fn(DeviceTableId, Vec<Row>) -> BoxFuture<'static, CResult<bool>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Continuous,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Stopped,
    Running,
    Paused,
}

#[derive(Clone)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub job_type: JobType,
    pub interval_ms: u64,
    pub table_ids: Vec<DeviceTableId>,
    pub triggers: HashMap<DeviceTableId, Vec<TriggerDef>>,
    pub batch_size: usize,
    pub read: ReadFn,
    pub write: WriteFn,
}
