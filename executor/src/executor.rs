//! The job state machine and handle table: `stopped | running |
//! paused`, one `tokio::task::JoinHandle` per running job, stop/pause
//! both realized as a `watch::Sender<bool>` flip plus a bounded join.

use std::sync::Arc;
use std::time::Duration;

use common::error::{CResult, EngineError};
use common::ids::JobId;
use dashmap::DashMap;
use metrics::MetricsRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use trigger::TriggerState;

use crate::types::{JobSnapshot, JobStatus};
use crate::worker;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct JobHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    status: JobStatus,
}

/// Owns every currently-known job's runtime handle. One instance lives
/// on the root `Engine` for the process lifetime.
pub struct JobExecutor {
    jobs: DashMap<JobId, JobHandle>,
    metrics: Arc<MetricsRegistry>,
    trigger_state: Arc<TriggerState>,
}

impl JobExecutor {
    pub fn new(metrics: Arc<MetricsRegistry>, trigger_state: Arc<TriggerState>) -> Self {
        Self {
            jobs: DashMap::new(),
            metrics,
            trigger_state,
        }
    }

    pub fn status(&self, job_id: JobId) -> JobStatus {
        self.jobs.get(&job_id).map(|h| h.status).unwrap_or(JobStatus::Stopped)
    }

    /// Starts a worker for `snapshot.job_id`. Requires the job not
    /// already be running.
    pub fn start(&self, snapshot: JobSnapshot) -> CResult<()> {
        let job_id = snapshot.job_id;
        if matches!(self.status(job_id), JobStatus::Running) {
            return Err(EngineError::Conflict(format!("job {job_id} already running")));
        }

        self.metrics.reset(job_id, common::time_util::now_utc());

        let (stop_tx, stop_rx) = watch::channel(false);
        let metrics = Arc::clone(&self.metrics);
        let trigger_state = Arc::clone(&self.trigger_state);

        let join = tokio::spawn(async move {
            worker::run(snapshot, trigger_state, metrics, stop_rx).await;
        });

        self.jobs.insert(
            job_id,
            JobHandle {
                stop_tx,
                join,
                status: JobStatus::Running,
            },
        );
        info!(%job_id, "job started");
        Ok(())
    }

    /// Signals stop and bounds the join with a 5-second timeout
    ///; a timed-out join abandons the task reference since the
    /// underlying `tokio::task` is a daemon.
    pub async fn stop(&self, job_id: JobId) -> CResult<()> {
        self.halt(job_id, JobStatus::Stopped).await
    }

    pub async fn pause(&self, job_id: JobId) -> CResult<()> {
        self.halt(job_id, JobStatus::Paused).await
    }

    async fn halt(&self, job_id: JobId, final_status: JobStatus) -> CResult<()> {
        let Some((_, handle)) = self.jobs.remove(&job_id) else {
            return Err(EngineError::NotFound(format!("job {job_id} not running")));
        };

        let _ = handle.stop_tx.send(true);
        match tokio::time::timeout(JOIN_TIMEOUT, handle.join).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%job_id, error = %err, "worker task panicked"),
            Err(_) => warn!(%job_id, "worker join timed out, abandoning task"),
        }

        self.jobs.insert(
            job_id,
            JobHandle {
                stop_tx: watch::channel(true).0,
                join: tokio::spawn(async {}),
                status: final_status,
            },
        );
        info!(%job_id, status = ?final_status, "job halted");
        Ok(())
    }

    /// Halts every active worker, used on process shutdown.
    pub async fn stop_all(&self) {
        let job_ids: Vec<JobId> = self.jobs.iter().map(|e| *e.key()).collect();
        for job_id in job_ids {
            if matches!(self.status(job_id), JobStatus::Running) {
                let _ = self.stop(job_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ids::DeviceTableId;
    use common::value::{FieldValue, Row};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::types::{JobType, ReadFn, WriteFn};

    fn snapshot(job_id: JobId, write_count: Arc<AtomicUsize>) -> JobSnapshot {
        let table_id = DeviceTableId::new();
        let read: ReadFn = Arc::new(move |_table_id| {
            Box::pin(async move {
                let mut row: Row = BTreeMap::new();
                row.insert("power".to_string(), FieldValue::Float(1.0));
                Ok(Some(row))
            })
        });
        let write: WriteFn = Arc::new(move |_table_id, rows| {
            let counter = Arc::clone(&write_count);
            Box::pin(async move {
                counter.fetch_add(rows.len(), Ordering::SeqCst);
                Ok(true)
            })
        });

        JobSnapshot {
            job_id,
            job_type: JobType::Continuous,
            interval_ms: 20,
            table_ids: vec![table_id],
            triggers: HashMap::new(),
            batch_size: 1,
            read,
            write,
        }
    }

    #[tokio::test]
    async fn start_then_stop_flushes_and_joins() {
        let executor = JobExecutor::new(Arc::new(MetricsRegistry::new()), Arc::new(TriggerState::new()));
        let job_id = JobId::new();
        let writes = Arc::new(AtomicUsize::new(0));

        executor.start(snapshot(job_id, Arc::clone(&writes))).unwrap();
        assert_eq!(executor.status(job_id), JobStatus::Running);

        tokio::time::sleep(Duration::from_millis(50)).await;
        executor.stop(job_id).await.unwrap();

        assert_eq!(executor.status(job_id), JobStatus::Stopped);
        assert!(writes.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn starting_an_already_running_job_conflicts() {
        let executor = JobExecutor::new(Arc::new(MetricsRegistry::new()), Arc::new(TriggerState::new()));
        let job_id = JobId::new();
        let writes = Arc::new(AtomicUsize::new(0));

        executor.start(snapshot(job_id, Arc::clone(&writes))).unwrap();
        let err = executor.start(snapshot(job_id, writes)).unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        executor.stop(job_id).await.unwrap();
    }
}
