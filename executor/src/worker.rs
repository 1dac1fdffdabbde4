//! The per-job cooperative loop: sequential table reads,
//! trigger-gated buffering, batch flush, interruptible pacing sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::ids::DeviceTableId;
use common::value::{stamp_timestamp, Row};
use metrics::MetricsRegistry;
use tokio::sync::watch;
use tracing::{error, warn};
use trigger::TriggerState;

use crate::types::{JobSnapshot, JobType};

pub async fn run(
    snapshot: JobSnapshot,
    trigger_state: Arc<TriggerState>,
    metrics: Arc<MetricsRegistry>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut buffers: HashMap<DeviceTableId, Vec<Row>> = HashMap::new();
    let interval = Duration::from_millis(snapshot.interval_ms);

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let t0 = Instant::now();

        for &table_id in &snapshot.table_ids {
            process_table(&snapshot, &trigger_state, &metrics, table_id, &mut buffers).await;
        }

        let elapsed = t0.elapsed();
        let sleep_for = interval.saturating_sub(elapsed);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    flush_all(&snapshot, &metrics, &mut buffers).await;
}

async fn process_table(
    snapshot: &JobSnapshot,
    trigger_state: &TriggerState,
    metrics: &MetricsRegistry,
    table_id: DeviceTableId,
    buffers: &mut HashMap<DeviceTableId, Vec<Row>>,
) {
    let read_t0 = Instant::now();
    let read_result = (snapshot.read)(table_id).await;
    let read_latency_ms = read_t0.elapsed().as_millis() as u64;

    let mut values = match read_result {
        Ok(Some(values)) => {
            metrics.with_job(snapshot.job_id, |m| m.record_read(read_latency_ms, Utc::now()));
            values
        }
        Ok(None) => {
            metrics.with_job(snapshot.job_id, |m| m.record_read(read_latency_ms, Utc::now()));
            return;
        }
        Err(err) => {
            metrics.with_job(snapshot.job_id, |m| m.record_read_error(err.code(), err.to_string(), Utc::now()));
            return;
        }
    };

    let should_write = match snapshot.job_type {
        JobType::Continuous => true,
        JobType::Trigger => {
            let triggers = snapshot.triggers.get(&table_id).map(Vec::as_slice).unwrap_or(&[]);
            let wrote = metrics.with_job(snapshot.job_id, |m| {
                trigger::evaluate(trigger_state, snapshot.job_id, table_id, &values, triggers, m, Utc::now())
            });
            wrote.unwrap_or(false)
        }
    };

    if !should_write {
        return;
    }

    stamp_timestamp(&mut values, Utc::now());
    let buffer = buffers.entry(table_id).or_default();
    buffer.push(values);

    if buffer.len() >= snapshot.batch_size.max(1) {
        let rows = std::mem::take(buffer);
        flush_table(snapshot, metrics, table_id, rows).await;
    }
}

async fn flush_table(snapshot: &JobSnapshot, metrics: &MetricsRegistry, table_id: DeviceTableId, rows: Vec<Row>) {
    let rows_len = rows.len() as u64;
    let write_t0 = Instant::now();
    let result = (snapshot.write)(table_id, rows).await;
    let write_latency_ms = write_t0.elapsed().as_millis() as u64;

    match result {
        Ok(_) => {
            metrics.with_job(snapshot.job_id, |m| m.record_write(write_latency_ms, rows_len, Utc::now()));
        }
        Err(err) => {
            metrics.with_job(snapshot.job_id, |m| m.record_write_error(err.code(), err.to_string(), Utc::now()));
        }
    }
}

async fn flush_all(snapshot: &JobSnapshot, metrics: &MetricsRegistry, buffers: &mut HashMap<DeviceTableId, Vec<Row>>) {
    for (table_id, rows) in buffers.drain() {
        if rows.is_empty() {
            continue;
        }
        let table_id_for_log = table_id;
        if let Err(err) = (snapshot.write)(table_id, rows).await {
            error!(job_id = %snapshot.job_id, table_id = %table_id_for_log, error = %err, "final flush failed on stop");
            metrics.with_job(snapshot.job_id, |m| m.record_write_error(err.code(), err.to_string(), Utc::now()));
        }
    }
    warn!(job_id = %snapshot.job_id, "worker stopped");
}
