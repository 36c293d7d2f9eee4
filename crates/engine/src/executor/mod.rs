//! Execution engine: drives a compiled workflow step by step, dispatching each
//! step to its capability and committing results into the run state.
//!
//! - `plan`: compiles definitions into steps with parsed templates and guards
//! - `step_once`: guard, resolve, dispatch, and bind for a single step
//! - `types`: audit records and the run report
//!
//! Steps are strictly sequential. The first failure ends the run; later steps
//! never dispatch.

pub mod plan;
mod step_once;
mod types;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{capability::CapabilityRegistry, error::RunError, workflow::state::RunState};

pub use plan::{CompiledStep, CompiledWorkflow};
use step_once::{RunScope, run_step};
pub use types::{RunReport, StepRecord, StepStatus};

/// Context key whose string value, when present, is used as the run id.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Returns the caller's correlation id, or a fresh timestamped id.
pub fn run_id_for(context: &JsonMap<String, Value>) -> String {
    if let Some(id) = context.get(CORRELATION_ID_KEY).and_then(Value::as_str)
        && !id.trim().is_empty()
    {
        return id.to_string();
    }
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("run-{}-{sequence}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
}

/// Executes compiled workflows against a capability registry.
#[derive(Debug, Clone, Copy)]
pub struct StepExecutor<'a> {
    registry: &'a CapabilityRegistry,
}

impl<'a> StepExecutor<'a> {
    pub fn new(registry: &'a CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// Runs every step of `workflow` and projects the declared outputs.
    ///
    /// `inputs` must already carry defaults; run-time validation happens
    /// before this is called.
    pub async fn execute(
        &self,
        workflow: &CompiledWorkflow,
        inputs: JsonMap<String, Value>,
        context: JsonMap<String, Value>,
        run_id: String,
        cancellation: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let scope = RunScope {
            run_id,
            workflow: workflow.name().to_string(),
            invocation: Arc::new(context.clone()),
            cancellation,
        };
        let mut state = RunState::new(inputs, context);
        let mut records = Vec::with_capacity(workflow.steps.len());

        info!(workflow = %scope.workflow, run_id = %scope.run_id, steps = workflow.steps.len(), "run started");
        for step in &workflow.steps {
            records.push(run_step(step, &mut state, self.registry, &scope).await?);
        }

        let (outputs, unbound) = state.project(&workflow.definition.outputs);
        for output in &unbound {
            warn!(workflow = %scope.workflow, output = %output, "output was not bound; a guarded step was skipped");
        }

        let report = RunReport {
            run_id: scope.run_id,
            workflow: scope.workflow,
            outputs,
            steps: records,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            workflow = %report.workflow,
            run_id = %report.run_id,
            skipped = report.skipped(),
            "run completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DuplicatePolicy, FnCapability};
    use patterns_types::{WorkflowDefinition, WorkflowStepDefinition};
    use serde_json::json;

    fn step(capability: &str, args: Value, binding: Option<&str>, when: Option<&str>) -> WorkflowStepDefinition {
        WorkflowStepDefinition {
            capability: capability.into(),
            args: args
                .as_object()
                .map(|map| map.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
                .unwrap_or_default(),
            binding: binding.map(str::to_string),
            when: when.map(str::to_string),
            ..Default::default()
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut builder = CapabilityRegistry::builder(DuplicatePolicy::Reject);
        builder
            .register(
                "core.echo",
                FnCapability::new(|arguments, _context| async move { Ok(Value::Object(arguments)) }),
                None,
            )
            .expect("echo");
        builder.build()
    }

    #[test]
    fn correlation_id_becomes_the_run_id() {
        let context = json!({"correlation_id": "abc-123"}).as_object().cloned().expect("object");
        assert_eq!(run_id_for(&context), "abc-123");

        let generated = run_id_for(&JsonMap::new());
        assert!(generated.starts_with("run-"));
        assert_ne!(generated, run_id_for(&JsonMap::new()));
    }

    #[tokio::test]
    async fn executes_steps_in_order_and_projects_outputs() {
        let workflow = CompiledWorkflow::compile(&WorkflowDefinition {
            workflow: "chain".into(),
            steps: vec![
                step("core.echo", json!({"value": "{{ seed }}"}), Some("first"), None),
                step("core.echo", json!({"value": "{{ first.value }}-2"}), Some("second"), None),
                step("core.echo", json!({}), Some("skipped"), Some("context.never")),
            ],
            outputs: vec!["second".into(), "skipped".into()],
            ..Default::default()
        })
        .expect("compile");

        let registry = registry();
        let report = StepExecutor::new(&registry)
            .execute(
                &workflow,
                json!({"seed": "1"}).as_object().cloned().expect("object"),
                json!({"never": false}).as_object().cloned().expect("object"),
                "run-test".into(),
                CancellationToken::new(),
            )
            .await
            .expect("run");

        assert_eq!(report.outputs.get("second"), Some(&json!({"value": "1-2"})));
        assert_eq!(report.outputs.get("skipped"), Some(&Value::Null));
        let statuses: Vec<_> = report.steps.iter().map(|record| record.status).collect();
        assert_eq!(statuses, vec![StepStatus::Succeeded, StepStatus::Succeeded, StepStatus::Skipped]);
        assert_eq!(report.skipped(), 1);
    }
}
