//! Process-wide metrics registry: one
//! `DashMap<JobId, Mutex<JobMetrics>>`. The owning worker locks briefly
//! to record; a snapshot reader locks briefly to clone a summary. A
//! `std::sync::Mutex` is correct here since no critical section ever
//! crosses an `.await`.

use std::sync::Mutex;

use common::ids::JobId;
use dashmap::DashMap;

use crate::job_metrics::{JobMetrics, JobMetricsSummary};

#[derive(Default)]
pub struct MetricsRegistry {
    jobs: DashMap<JobId, Mutex<JobMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets (or creates) the entry for `job_id`, per the "reset on
    /// job start" rule.
    pub fn reset(&self, job_id: JobId, now: chrono::DateTime<chrono::Utc>) {
        let entry = self.jobs.entry(job_id).or_default();
        entry.lock().unwrap().reset(now);
    }

    pub fn with_job<R>(&self, job_id: JobId, f: impl FnOnce(&mut JobMetrics) -> R) -> Option<R> {
        let entry = self.jobs.get(&job_id)?;
        let mut guard = entry.lock().unwrap();
        Some(f(&mut guard))
    }

    pub fn snapshot(&self, job_id: JobId) -> Option<JobMetricsSummary> {
        let entry = self.jobs.get(&job_id)?;
        let guard = entry.lock().unwrap();
        Some(guard.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn reset_then_record_is_visible_in_snapshot() {
        let registry = MetricsRegistry::new();
        let job_id = JobId::new();

        registry.reset(job_id, Utc::now());
        registry.with_job(job_id, |m| m.record_read(12, Utc::now()));

        let summary = registry.snapshot(job_id).unwrap();
        assert_eq!(summary.reads, 1);
    }

    #[test]
    fn snapshot_of_unknown_job_is_none() {
        let registry = MetricsRegistry::new();
        assert!(registry.snapshot(JobId::new()).is_none());
    }
}
