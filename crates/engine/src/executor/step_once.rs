//! Single-step execution.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{StepRecord, StepStatus, plan::CompiledStep};
use crate::{
    capability::{CapabilityContext, CapabilityRegistry},
    error::RunError,
    template::resolve_arguments,
    workflow::state::RunState,
};

/// Run-scoped values shared by every step of one run.
#[derive(Debug, Clone)]
pub(crate) struct RunScope {
    pub run_id: String,
    pub workflow: String,
    pub invocation: Arc<JsonMap<String, Value>>,
    pub cancellation: CancellationToken,
}

/// Drives one step through guard, resolve, dispatch, and bind.
///
/// The binding is committed to `state` only when the provider succeeds.
pub(crate) async fn run_step(
    step: &CompiledStep,
    state: &mut RunState,
    registry: &CapabilityRegistry,
    scope: &RunScope,
) -> Result<StepRecord, RunError> {
    let started_at = Utc::now();
    let record = |status| StepRecord {
        index: step.index,
        capability: step.capability.clone(),
        binding: step.binding.clone(),
        status,
        started_at,
        finished_at: Utc::now(),
    };

    if scope.cancellation.is_cancelled() {
        return Err(cancelled(scope, step));
    }

    if let Some(guard) = &step.guard {
        let proceed = guard.evaluate(state).map_err(|source| RunError::UnresolvedReference {
            step: step.index,
            capability: step.capability.clone(),
            source,
        })?;
        if !proceed {
            warn!(
                workflow = %scope.workflow,
                step = step.index,
                capability = %step.capability,
                "step skipped by guard"
            );
            return Ok(record(StepStatus::Skipped));
        }
    }

    let arguments = resolve_arguments(&step.arguments, state).map_err(|source| RunError::UnresolvedReference {
        step: step.index,
        capability: step.capability.clone(),
        source,
    })?;

    let provider = registry.resolve(&step.capability).map_err(|source| RunError::Dispatch {
        step: step.index,
        capability: step.capability.clone(),
        source,
    })?;

    let context = CapabilityContext {
        run_id: scope.run_id.clone(),
        workflow: scope.workflow.clone(),
        step: step.index,
        invocation: Arc::clone(&scope.invocation),
        cancellation: scope.cancellation.child_token(),
    };

    debug!(workflow = %scope.workflow, step = step.index, capability = %step.capability, "dispatching step");
    let outcome = tokio::select! {
        biased;
        _ = scope.cancellation.cancelled() => return Err(cancelled(scope, step)),
        outcome = provider.invoke(arguments, &context) => outcome,
    };
    let value = outcome.map_err(|cause| RunError::ProviderFailure {
        step: step.index,
        capability: step.capability.clone(),
        cause,
    })?;

    if let Some(binding) = &step.binding {
        debug!(workflow = %scope.workflow, step = step.index, binding = %binding, "binding step result");
        state.bind(binding.clone(), value);
    }
    Ok(record(StepStatus::Succeeded))
}

fn cancelled(scope: &RunScope, step: &CompiledStep) -> RunError {
    RunError::Cancelled {
        workflow: scope.workflow.clone(),
        step: step.index,
    }
}
