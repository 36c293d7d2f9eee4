//! Core executor data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Status of an executed step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step did not run because its guard evaluated false.
    Skipped,
    /// Provider returned a value and the binding (if any) was committed.
    Succeeded,
}

/// Audit entry for one step of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    /// Zero-based step index.
    pub index: usize,
    pub capability: String,
    /// Name the result was bound under, when the step declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub workflow: String,
    /// Bindings projected onto the workflow's declared outputs.
    pub outputs: JsonMap<String, Value>,
    /// One record per step, in execution order.
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of steps whose guard evaluated false.
    pub fn skipped(&self) -> usize {
        self.steps.iter().filter(|record| record.status == StepStatus::Skipped).count()
    }
}
