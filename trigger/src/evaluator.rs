//! The nine-operator trigger evaluation rule.

use chrono::{DateTime, Utc};
use common::ids::{DeviceTableId, JobId};
use common::value::{FieldValue, Row};
use metrics::JobMetrics;

use crate::state::TriggerState;
use crate::types::{FireOutcome, Operator, TriggerDef};

/// Evaluates every trigger against `values`, updates `state`, records
/// counters on `metrics`, and returns the write decision: true iff any
/// trigger fired and was not suppressed.
pub fn evaluate(
    state: &TriggerState,
    job_id: JobId,
    table_id: DeviceTableId,
    values: &Row,
    triggers: &[TriggerDef],
    metrics: &mut JobMetrics,
    now: DateTime<Utc>,
) -> bool {
    let mut should_write = false;

    for trigger in triggers {
        metrics.record_trigger_evaluated();

        let Some(new) = values.get(&trigger.field) else {
            continue;
        };
        let old = state.last_value(job_id, table_id, &trigger.field);

        let outcome = evaluate_one(trigger, old.as_ref(), new);

        let outcome = match outcome {
            FireOutcome::Fired if trigger.cooldown_ms > 0 => {
                let elapsed = state
                    .last_fire(table_id, &trigger.field)
                    .map(|prev| (now - prev).num_milliseconds())
                    .unwrap_or(i64::MAX);
                if elapsed < trigger.cooldown_ms {
                    FireOutcome::Suppressed
                } else {
                    state.record_fire(table_id, &trigger.field, now);
                    FireOutcome::Fired
                }
            }
            FireOutcome::Fired => {
                state.record_fire(table_id, &trigger.field, now);
                FireOutcome::Fired
            }
            other => other,
        };

        match outcome {
            FireOutcome::Fired => {
                metrics.record_trigger_fired();
                should_write = true;
            }
            FireOutcome::Suppressed => metrics.record_trigger_suppressed(),
            FireOutcome::NotFired => {}
        }
    }

    state.update_last_values(job_id, table_id, values);
    should_write
}

fn evaluate_one(trigger: &TriggerDef, old: Option<&FieldValue>, new: &FieldValue) -> FireOutcome {
    let fired = match trigger.operator {
        Operator::Change => match old {
            None => false,
            Some(old) => changed_beyond_deadband(old, new, trigger.deadband),
        },
        Operator::Rising => match (old, &trigger.threshold) {
            (Some(old), Some(threshold)) => {
                let (old, new, threshold) = match numeric_triplet(old, new, threshold) {
                    Some(t) => t,
                    None => return FireOutcome::NotFired,
                };
                old <= threshold && new > threshold
            }
            _ => false,
        },
        Operator::Falling => match (old, &trigger.threshold) {
            (Some(old), Some(threshold)) => {
                let (old, new, threshold) = match numeric_triplet(old, new, threshold) {
                    Some(t) => t,
                    None => return FireOutcome::NotFired,
                };
                old >= threshold && new < threshold
            }
            _ => false,
        },
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Eq | Operator::Neq => {
            match &trigger.threshold {
                None => false,
                Some(threshold) => compare(trigger.operator, new, threshold),
            }
        }
    };

    if fired {
        FireOutcome::Fired
    } else {
        FireOutcome::NotFired
    }
}

fn changed_beyond_deadband(old: &FieldValue, new: &FieldValue, deadband: f64) -> bool {
    match (old.as_f64(), new.as_f64()) {
        (Some(old), Some(new)) => (new - old).abs() > deadband,
        _ => old != new,
    }
}

fn numeric_triplet(old: &FieldValue, new: &FieldValue, threshold: &FieldValue) -> Option<(f64, f64, f64)> {
    Some((old.as_f64()?, new.as_f64()?, threshold.as_f64()?))
}

fn compare(op: Operator, new: &FieldValue, threshold: &FieldValue) -> bool {
    if let (Some(new), Some(threshold)) = (new.as_f64(), threshold.as_f64()) {
        return match op {
            Operator::Gt => new > threshold,
            Operator::Gte => new >= threshold,
            Operator::Lt => new < threshold,
            Operator::Lte => new <= threshold,
            Operator::Eq => new == threshold,
            Operator::Neq => new != threshold,
            _ => unreachable!(),
        };
    }
    match op {
        Operator::Eq => new == threshold,
        Operator::Neq => new != threshold,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(value: f64) -> Row {
        let mut r: Row = BTreeMap::new();
        r.insert("power".to_string(), FieldValue::Float(value));
        r
    }

    fn change_trigger(deadband: f64) -> TriggerDef {
        TriggerDef {
            field: "power".to_string(),
            operator: Operator::Change,
            threshold: None,
            deadband,
            cooldown_ms: 0,
        }
    }

    #[test]
    fn change_does_not_fire_on_first_observation() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let wrote = evaluate(&state, job, table, &row(10.0), &[change_trigger(0.5)], &mut m, Utc::now());
        assert!(!wrote);
        assert_eq!(m.triggers_evaluated, 1);
        assert_eq!(m.triggers_fired, 0);
    }

    #[test]
    fn change_fires_beyond_deadband() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let triggers = [change_trigger(0.5)];

        evaluate(&state, job, table, &row(10.0), &triggers, &mut m, Utc::now());
        let wrote = evaluate(&state, job, table, &row(10.2), &triggers, &mut m, Utc::now());
        assert!(!wrote);

        let wrote = evaluate(&state, job, table, &row(11.0), &triggers, &mut m, Utc::now());
        assert!(wrote);
        assert_eq!(m.triggers_fired, 1);
    }

    #[test]
    fn cooldown_suppresses_rapid_refires() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let triggers = [TriggerDef {
            field: "power".to_string(),
            operator: Operator::Change,
            threshold: None,
            deadband: 0.0,
            cooldown_ms: 10_000,
        }];

        let t0 = Utc::now();
        evaluate(&state, job, table, &row(1.0), &triggers, &mut m, t0);
        let wrote_first = evaluate(&state, job, table, &row(2.0), &triggers, &mut m, t0);
        assert!(wrote_first);

        let t1 = t0 + chrono::Duration::milliseconds(500);
        let wrote_second = evaluate(&state, job, table, &row(3.0), &triggers, &mut m, t1);
        assert!(!wrote_second);
        assert_eq!(m.triggers_suppressed, 1);

        let t2 = t0 + chrono::Duration::milliseconds(20_000);
        let wrote_third = evaluate(&state, job, table, &row(4.0), &triggers, &mut m, t2);
        assert!(wrote_third);
        assert_eq!(m.triggers_fired, 2);
    }

    #[test]
    fn rising_fires_on_threshold_crossing() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let triggers = [TriggerDef {
            field: "power".to_string(),
            operator: Operator::Rising,
            threshold: Some(FieldValue::Float(5.0)),
            deadband: 0.0,
            cooldown_ms: 0,
        }];

        evaluate(&state, job, table, &row(4.0), &triggers, &mut m, Utc::now());
        let wrote = evaluate(&state, job, table, &row(6.0), &triggers, &mut m, Utc::now());
        assert!(wrote);
    }

    #[test]
    fn threshold_compare_without_old_value_can_still_fire() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let triggers = [TriggerDef {
            field: "power".to_string(),
            operator: Operator::Gt,
            threshold: Some(FieldValue::Float(5.0)),
            deadband: 0.0,
            cooldown_ms: 0,
        }];

        let wrote = evaluate(&state, job, table, &row(6.0), &triggers, &mut m, Utc::now());
        assert!(wrote);
    }

    #[test]
    fn missing_field_is_skipped() {
        let state = TriggerState::new();
        let mut m = JobMetrics::default();
        let job = JobId::new();
        let table = DeviceTableId::new();
        let triggers = [change_trigger(0.0)];
        let mut r: Row = BTreeMap::new();
        r.insert("other".to_string(), FieldValue::Float(1.0));

        let wrote = evaluate(&state, job, table, &r, &triggers, &mut m, Utc::now());
        assert!(!wrote);
    }
}
