use common::value::FieldValue;
use serde::{Deserialize, Serialize};

/// `JobTrigger.operator`: the comparison a trigger evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Change,
    Rising,
    Falling,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// One `JobTrigger` bound to a field.
#[derive(Debug, Clone)]
pub struct TriggerDef {
    pub field: String,
    pub operator: Operator,
    pub threshold: Option<FieldValue>,
    pub deadband: f64,
    pub cooldown_ms: i64,
}

/// Outcome of evaluating one [`TriggerDef`] against one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    NotFired,
    Fired,
    Suppressed,
}
