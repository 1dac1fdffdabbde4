//! The root `Engine` handle: one value bundling the catalog, executor,
//! and metrics registry as process-wide singletons, with a lifetime
//! bracketing the agent process.

use std::sync::Arc;

use catalog::{CatalogEngine, CatalogGateway};
use common::error::CResult;
use common::ids::{DeviceTableId, JobId, JobRunId};
use common::value::Row;
use dashmap::DashMap;
use executor::JobExecutor;
use metrics::{JobMetricsSummary, MetricsRegistry};
use trigger::TriggerState;

pub struct Engine {
    pub catalog: Arc<CatalogEngine>,
    pub executor: Arc<JobExecutor>,
    pub metrics: Arc<MetricsRegistry>,
    active_runs: DashMap<JobId, JobRunId>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let trigger_state = Arc::new(TriggerState::new());
        Self {
            catalog: Arc::new(CatalogEngine::new()),
            executor: Arc::new(JobExecutor::new(Arc::clone(&metrics), trigger_state)),
            metrics,
            active_runs: DashMap::new(),
        }
    }

    pub async fn run_job(&self, job_id: JobId) -> CResult<()> {
        let snapshot = self.catalog.load_job_snapshot(job_id).await?;
        let run_id = self.catalog.record_job_started(job_id).await?;
        self.executor.start(snapshot)?;
        self.active_runs.insert(job_id, run_id);
        Ok(())
    }

    pub async fn stop_job(&self, job_id: JobId) -> CResult<()> {
        self.executor.stop(job_id).await?;
        if let Some((_, run_id)) = self.active_runs.remove(&job_id) {
            let summary = self.metrics.snapshot(job_id).unwrap_or_else(|| JobMetricsSummary {
                reads: 0,
                read_errors: 0,
                writes: 0,
                write_errors: 0,
                rows_written: 0,
                triggers_evaluated: 0,
                triggers_fired: 0,
                triggers_suppressed: 0,
                started_at: None,
                last_read_at: None,
                last_write_at: None,
                avg_read_ms: None,
                p95_read_ms: None,
                avg_write_ms: None,
                p95_write_ms: None,
                errors: vec![],
            });
            self.catalog.record_job_finished(job_id, run_id, summary).await?;
        }
        Ok(())
    }

    pub async fn migrate_table(&self, device_table_id: DeviceTableId) -> CResult<()> {
        self.catalog.migrate_table(device_table_id).await
    }

    /// Runs the read side of every table once without invoking the
    /// write callback.
    pub async fn dry_run(&self, job_id: JobId) -> CResult<Vec<(DeviceTableId, CResult<Option<Row>>)>> {
        let snapshot = self.catalog.load_job_snapshot(job_id).await?;
        let mut report = Vec::with_capacity(snapshot.table_ids.len());
        for table_id in snapshot.table_ids.clone() {
            let result = (snapshot.read)(table_id).await;
            report.push((table_id, result));
        }
        Ok(report)
    }
}
