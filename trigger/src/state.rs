//! Stateful inputs to evaluation: last observed values per
//! `(job, table)`, and last-fire timestamps per `(table, field)` for
//! cooldown gating.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::ids::{DeviceTableId, JobId};
use common::value::FieldValue;
use dashmap::DashMap;

#[derive(Default)]
pub struct TriggerState {
    last_values: DashMap<(JobId, DeviceTableId), HashMap<String, FieldValue>>,
    cooldowns: DashMap<(DeviceTableId, String), DateTime<Utc>>,
}

impl TriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn last_value(&self, job_id: JobId, table_id: DeviceTableId, field: &str) -> Option<FieldValue> {
        self.last_values.get(&(job_id, table_id)).and_then(|m| m.get(field).cloned())
    }

    pub(crate) fn update_last_values(&self, job_id: JobId, table_id: DeviceTableId, values: &common::value::Row) {
        let mut entry = self.last_values.entry((job_id, table_id)).or_default();
        for (field, value) in values {
            if field == common::value::TIMESTAMP_COLUMN {
                continue;
            }
            entry.insert(field.clone(), value.clone());
        }
    }

    pub(crate) fn last_fire(&self, table_id: DeviceTableId, field: &str) -> Option<DateTime<Utc>> {
        self.cooldowns.get(&(table_id, field.to_string())).map(|v| *v)
    }

    pub(crate) fn record_fire(&self, table_id: DeviceTableId, field: &str, now: DateTime<Utc>) {
        self.cooldowns.insert((table_id, field.to_string()), now);
    }
}
