//! Per-job metrics: counters, two rolling latency windows, and a
//! bounded error log, all reset together on job start.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::window::LatencyWindow;

const ERROR_LOG_CAP: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct JobMetrics {
    pub reads: u64,
    pub read_errors: u64,
    pub writes: u64,
    pub write_errors: u64,
    pub rows_written: u64,
    pub triggers_evaluated: u64,
    pub triggers_fired: u64,
    pub triggers_suppressed: u64,

    pub started_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_write_at: Option<DateTime<Utc>>,

    read_latencies: LatencyWindow,
    write_latencies: LatencyWindow,
    errors: VecDeque<ErrorEntry>,
}

impl JobMetrics {
    /// Clears all counters, timestamps, windows and the error log.
    /// Called on job start, never on pause.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = JobMetrics {
            started_at: Some(now),
            ..JobMetrics::default()
        };
    }

    pub fn record_read(&mut self, latency_ms: u64, now: DateTime<Utc>) {
        self.reads += 1;
        self.read_latencies.push(latency_ms);
        self.last_read_at = Some(now);
    }

    pub fn record_read_error(&mut self, code: &str, message: impl Into<String>, now: DateTime<Utc>) {
        self.read_errors += 1;
        self.push_error(code, message, now);
    }

    pub fn record_write(&mut self, latency_ms: u64, rows: u64, now: DateTime<Utc>) {
        self.writes += 1;
        self.rows_written += rows;
        self.write_latencies.push(latency_ms);
        self.last_write_at = Some(now);
    }

    pub fn record_write_error(&mut self, code: &str, message: impl Into<String>, now: DateTime<Utc>) {
        self.write_errors += 1;
        self.push_error(code, message, now);
    }

    pub fn record_trigger_evaluated(&mut self) {
        self.triggers_evaluated += 1;
    }

    pub fn record_trigger_fired(&mut self) {
        self.triggers_fired += 1;
    }

    pub fn record_trigger_suppressed(&mut self) {
        self.triggers_suppressed += 1;
    }

    fn push_error(&mut self, code: &str, message: impl Into<String>, now: DateTime<Utc>) {
        if self.errors.len() == ERROR_LOG_CAP {
            self.errors.pop_front();
        }
        self.errors.push_back(ErrorEntry {
            code: code.to_string(),
            message: message.into(),
            timestamp: now,
        });
    }

    pub fn summary(&self) -> JobMetricsSummary {
        JobMetricsSummary {
            reads: self.reads,
            read_errors: self.read_errors,
            writes: self.writes,
            write_errors: self.write_errors,
            rows_written: self.rows_written,
            triggers_evaluated: self.triggers_evaluated,
            triggers_fired: self.triggers_fired,
            triggers_suppressed: self.triggers_suppressed,
            started_at: self.started_at,
            last_read_at: self.last_read_at,
            last_write_at: self.last_write_at,
            avg_read_ms: self.read_latencies.avg(),
            p95_read_ms: self.read_latencies.p95(),
            avg_write_ms: self.write_latencies.avg(),
            p95_write_ms: self.write_latencies.p95(),
            errors: self.errors.iter().cloned().collect(),
        }
    }
}

/// A clone of a [`JobMetrics`] snapshot for readers outside the owning
/// worker (the catalog gateway, on stop/pause).
#[derive(Debug, Clone, Serialize)]
pub struct JobMetricsSummary {
    pub reads: u64,
    pub read_errors: u64,
    pub writes: u64,
    pub write_errors: u64,
    pub rows_written: u64,
    pub triggers_evaluated: u64,
    pub triggers_fired: u64,
    pub triggers_suppressed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_write_at: Option<DateTime<Utc>>,
    pub avg_read_ms: Option<f64>,
    pub p95_read_ms: Option<u64>,
    pub avg_write_ms: Option<f64>,
    pub p95_write_ms: Option<u64>,
    pub errors: Vec<ErrorEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_counters_but_stamps_started_at() {
        let mut m = JobMetrics::default();
        let t0 = Utc::now();
        m.record_read(5, t0);
        m.record_read_error("TRANSPORT_ERROR", "timeout", t0);

        let t1 = t0 + chrono::Duration::seconds(1);
        m.reset(t1);

        assert_eq!(m.reads, 0);
        assert_eq!(m.read_errors, 0);
        assert_eq!(m.started_at, Some(t1));
    }

    #[test]
    fn error_log_is_bounded() {
        let mut m = JobMetrics::default();
        let now = Utc::now();
        for i in 0..150 {
            m.record_read_error("TRANSPORT_ERROR", format!("err-{i}"), now);
        }
        let summary = m.summary();
        assert_eq!(summary.errors.len(), 100);
        assert_eq!(summary.errors.first().unwrap().message, "err-50");
    }
}
