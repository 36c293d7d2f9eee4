//! Per-invocation validation.

use std::collections::BTreeSet;

use patterns_types::{Diagnostic, DiagnosticKind, Severity, validate_input_value};
use serde_json::{Map as JsonMap, Value};

use crate::{
    executor::plan::CompiledWorkflow,
    workflow::state::{CONTEXT_ROOT, INPUTS_ROOT, is_reserved_name},
};

/// Walks the steps in order and reports every reference whose root is not
/// available at that point.
///
/// `initial` holds the input names visible to the first step; the `inputs`
/// and `context` roots are always available. A step's `as` name becomes
/// available to the steps after it, whether or not the step is guarded.
pub fn check_references<I>(workflow: &CompiledWorkflow, initial: I) -> Vec<Diagnostic>
where
    I: IntoIterator<Item = String>,
{
    let mut available: BTreeSet<String> = initial.into_iter().filter(|name| !is_reserved_name(name)).collect();
    available.insert(INPUTS_ROOT.to_string());
    available.insert(CONTEXT_ROOT.to_string());

    let mut violations = Vec::new();
    for step in &workflow.steps {
        for reference in step.references() {
            if available.contains(reference.root()) {
                continue;
            }
            let listed = available.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
            violations.push(
                Diagnostic::error(
                    workflow.name(),
                    DiagnosticKind::UnresolvedReference,
                    format!(
                        "step {} ('{}') references '{}' but '{}' is not bound before this step (available: {})",
                        step.index,
                        step.capability,
                        reference,
                        reference.root(),
                        listed
                    ),
                )
                .at_step(step.index)
                .about(reference.root()),
            );
        }
        if let Some(binding) = &step.binding {
            available.insert(binding.clone());
        }
    }
    violations
}

/// Static reference check used for introspection.
///
/// Declared inputs are the initial available set. A reference to a name some
/// step binds later (or to the step's own binding) is an error; any other
/// unknown root may still be supplied as an undeclared input at run time, so
/// it is reported as a warning.
pub fn lint_references(workflow: &CompiledWorkflow) -> Vec<Diagnostic> {
    let bindings: BTreeSet<&str> = workflow.definition.binding_names().collect();
    check_references(workflow, workflow.definition.inputs.keys().cloned())
        .into_iter()
        .map(|mut diagnostic| {
            let forward = diagnostic.subject.as_deref().is_some_and(|subject| bindings.contains(subject));
            if !forward {
                diagnostic.severity = Severity::Warning;
                diagnostic.message.push_str("; it must be supplied as an input");
            }
            diagnostic
        })
        .collect()
}

/// Checks an invocation before any provider runs.
///
/// Applies declared defaults, verifies required inputs and their types, then
/// checks every reference. Returns the effective input map, or every
/// violation found.
pub fn validate_invocation(
    workflow: &CompiledWorkflow,
    inputs: &JsonMap<String, Value>,
) -> Result<JsonMap<String, Value>, Vec<Diagnostic>> {
    let mut effective = inputs.clone();
    let mut violations = Vec::new();
    let mut missing = Vec::new();

    for (name, definition) in &workflow.definition.inputs {
        let supplied = effective.get(name).filter(|value| !(value.is_null() && !definition.is_required())).cloned();
        match supplied {
            Some(value) => {
                if let Err(reason) = validate_input_value(&value, definition) {
                    violations.push(
                        Diagnostic::error(workflow.name(), DiagnosticKind::InvalidInput, format!("input '{name}': {reason}")).about(name),
                    );
                }
            }
            None => match &definition.default {
                Some(default) => {
                    effective.insert(name.clone(), default.clone());
                }
                None if definition.optional => {
                    effective.remove(name);
                }
                None => {
                    violations.push(
                        Diagnostic::error(workflow.name(), DiagnosticKind::MissingInput, format!("required input '{name}' was not supplied"))
                            .about(name),
                    );
                    missing.push(name.clone());
                }
            },
        }
    }

    // A step binding is only available after its step; a caller input of the
    // same name must not stand in for it.
    for step in &workflow.steps {
        let Some(binding) = step.binding.as_deref() else {
            continue;
        };
        if inputs.contains_key(binding) {
            violations.push(
                Diagnostic::error(
                    workflow.name(),
                    DiagnosticKind::InvalidInput,
                    format!("input '{binding}' collides with the binding of step {} ('{}')", step.index, step.capability),
                )
                .at_step(step.index)
                .about(binding),
            );
        }
    }
    let bindings: BTreeSet<&str> = workflow.definition.binding_names().collect();
    let initial = effective
        .keys()
        .filter(|name| !bindings.contains(name.as_str()))
        .cloned()
        .chain(missing);

    // Missing inputs are already reported; their references are not repeated.
    violations.extend(check_references(workflow, initial));

    if violations.is_empty() { Ok(effective) } else { Err(violations) }
}
