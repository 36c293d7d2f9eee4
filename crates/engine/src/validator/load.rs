//! Load-time validation of a single workflow definition.

use std::collections::{HashMap, HashSet};

use patterns_types::{CapabilityContract, Diagnostic, DiagnosticKind, Maturity, Severity, WorkflowDefinition, validate_input_value};
use tracing::debug;

use super::ValidationConfig;
use crate::{
    capability::CapabilityRegistry,
    executor::plan::{CompiledStep, CompiledWorkflow},
    template::{PathSegment, Template},
    workflow::state::is_reserved_name,
};

/// Name used in diagnostics for a definition without an identifier.
pub const UNNAMED_WORKFLOW: &str = "<unnamed>";

/// Result of validating one definition.
///
/// `workflow` is present only when no diagnostic has error severity.
#[derive(Debug, Clone)]
pub struct DefinitionOutcome {
    pub workflow: Option<CompiledWorkflow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DefinitionOutcome {
    pub fn is_accepted(&self) -> bool {
        self.workflow.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diagnostic| diagnostic.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diagnostic| !diagnostic.is_error())
    }
}

/// Runs every load-time check against `definition`.
///
/// All findings are collected; compilation output is kept only when none of
/// them is an error.
pub fn validate_definition(
    definition: &WorkflowDefinition,
    registry: &CapabilityRegistry,
    config: &ValidationConfig,
) -> DefinitionOutcome {
    let name = if definition.workflow.trim().is_empty() {
        UNNAMED_WORKFLOW.to_string()
    } else {
        definition.workflow.clone()
    };
    let mut diagnostics = Vec::new();

    if definition.workflow.trim().is_empty() {
        diagnostics.push(Diagnostic::error(
            name.clone(),
            DiagnosticKind::MissingIdentifier,
            "workflow definition has no identifier",
        ));
    }
    if definition.steps.is_empty() {
        diagnostics.push(Diagnostic::error(name.clone(), DiagnosticKind::NoSteps, "workflow declares no steps"));
    }

    check_capabilities(&name, definition, registry, &mut diagnostics);
    check_inputs(&name, definition, &mut diagnostics);
    check_bindings(&name, definition, &mut diagnostics);
    check_outputs(&name, definition, &mut diagnostics);

    let compiled = match CompiledWorkflow::compile(definition) {
        Ok(compiled) => {
            check_contracts(&name, &compiled, registry, config, &mut diagnostics);
            Some(compiled)
        }
        Err(template_errors) => {
            diagnostics.extend(template_errors);
            None
        }
    };

    let accepted = !diagnostics.iter().any(Diagnostic::is_error);
    debug!(workflow = %name, accepted, diagnostics = diagnostics.len(), "definition validated");
    DefinitionOutcome {
        workflow: compiled.filter(|_| accepted),
        diagnostics,
    }
}

fn check_capabilities(name: &str, definition: &WorkflowDefinition, registry: &CapabilityRegistry, diagnostics: &mut Vec<Diagnostic>) {
    for (index, step) in definition.steps.iter().enumerate() {
        if !registry.contains(&step.capability) {
            diagnostics.push(
                Diagnostic::error(
                    name,
                    DiagnosticKind::UnknownCapability,
                    format!("step {index} uses unregistered capability '{}'", step.capability),
                )
                .at_step(index)
                .about(&step.capability),
            );
        }
    }
}

fn check_inputs(name: &str, definition: &WorkflowDefinition, diagnostics: &mut Vec<Diagnostic>) {
    for (input, declared) in &definition.inputs {
        if is_reserved_name(input) {
            diagnostics.push(
                Diagnostic::error(name, DiagnosticKind::DuplicateBinding, format!("input '{input}' uses a reserved name")).about(input),
            );
        }
        if let Some(default) = &declared.default
            && let Err(reason) = validate_input_value(default, declared)
        {
            diagnostics.push(
                Diagnostic::error(name, DiagnosticKind::InvalidInputDefault, format!("default for input '{input}': {reason}"))
                    .about(input),
            );
        }
    }
}

fn check_bindings(name: &str, definition: &WorkflowDefinition, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (index, step) in definition.steps.iter().enumerate() {
        let Some(binding) = step.binding.as_deref() else {
            continue;
        };
        let problem = if is_reserved_name(binding) {
            Some(format!("step {index} binds reserved name '{binding}'"))
        } else if definition.inputs.contains_key(binding) {
            Some(format!("step {index} binding '{binding}' shadows a declared input"))
        } else {
            seen.get(binding)
                .map(|first| format!("step {index} binding '{binding}' repeats the binding of step {first}"))
        };
        match problem {
            Some(message) => diagnostics.push(
                Diagnostic::error(name, DiagnosticKind::DuplicateBinding, message)
                    .at_step(index)
                    .about(binding),
            ),
            None => {
                seen.insert(binding, index);
            }
        }
    }
}

fn check_outputs(name: &str, definition: &WorkflowDefinition, diagnostics: &mut Vec<Diagnostic>) {
    let bound: HashSet<&str> = definition
        .binding_names()
        .chain(definition.inputs.keys().map(String::as_str))
        .collect();
    for output in &definition.outputs {
        if !bound.contains(output.as_str()) {
            diagnostics.push(
                Diagnostic::error(
                    name,
                    DiagnosticKind::OutputNotBound,
                    format!("output '{output}' is not bound by any step or declared input"),
                )
                .about(output),
            );
        }
    }
}

fn check_contracts(
    name: &str,
    workflow: &CompiledWorkflow,
    registry: &CapabilityRegistry,
    config: &ValidationConfig,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut producers: HashMap<&str, (&CompiledStep, &CapabilityContract)> = HashMap::new();

    for step in &workflow.steps {
        check_downstream_references(name, step, &producers, config.contract_mismatch, diagnostics);

        let Ok(Some(contract)) = registry.describe(&step.capability) else {
            continue;
        };

        if contract.maturity == Maturity::Placeholder {
            diagnostics.push(
                Diagnostic::new(
                    name,
                    DiagnosticKind::PlaceholderCapability,
                    config.placeholder_capability,
                    format!("step {} depends on placeholder capability '{}'", step.index, step.capability),
                )
                .at_step(step.index)
                .about(&step.capability),
            );
        }
        check_arguments(name, step, contract, config.contract_mismatch, diagnostics);

        if let Some(binding) = step.binding.as_deref() {
            producers.insert(binding, (step, contract));
        }
    }
}

fn check_arguments(name: &str, step: &CompiledStep, contract: &CapabilityContract, severity: Severity, diagnostics: &mut Vec<Diagnostic>) {
    let mismatch = |message: String, subject: &str| {
        Diagnostic::new(name, DiagnosticKind::ContractMismatch, severity, message)
            .at_step(step.index)
            .about(subject)
    };

    for field in contract.inputs.iter().filter(|field| field.required) {
        if !step.arguments.contains_key(&field.name) {
            diagnostics.push(mismatch(
                format!("step {} ('{}') is missing required argument '{}'", step.index, step.capability, field.name),
                &field.name,
            ));
        }
    }

    // A contract that declares no inputs does not constrain argument names.
    if contract.inputs.is_empty() {
        return;
    }
    for (argument, template) in &step.arguments {
        match contract.input(argument) {
            None => diagnostics.push(mismatch(
                format!("step {} ('{}') passes undeclared argument '{argument}'", step.index, step.capability),
                argument,
            )),
            Some(field) => {
                if let Template::Literal(value) = template
                    && !field.r#type.accepts(value)
                {
                    diagnostics.push(mismatch(
                        format!(
                            "step {} ('{}') argument '{argument}' expects {}, got {value}",
                            step.index, step.capability, field.r#type
                        ),
                        argument,
                    ));
                }
            }
        }
    }
}

fn check_downstream_references(
    name: &str,
    step: &CompiledStep,
    producers: &HashMap<&str, (&CompiledStep, &CapabilityContract)>,
    severity: Severity,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for reference in step.references() {
        let Some((producer, contract)) = producers.get(reference.root()) else {
            continue;
        };
        if contract.outputs.is_empty() {
            continue;
        }
        let Some(PathSegment::Key(field)) = reference.segments().first() else {
            continue;
        };
        if contract.output(field).is_none() {
            diagnostics.push(
                Diagnostic::new(
                    name,
                    DiagnosticKind::ContractMismatch,
                    severity,
                    format!(
                        "step {} references '{reference}' but '{}' (step {}) declares no output '{field}'",
                        step.index, producer.capability, producer.index
                    ),
                )
                .at_step(step.index)
                .about(reference.as_str()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{Capability, CapabilityContext, DuplicatePolicy},
        error::CapabilityError,
    };
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use patterns_types::{ValueType, WorkflowInputDefinition, WorkflowStepDefinition};
    use serde_json::{Map as JsonMap, Value, json};

    struct Noop;

    #[async_trait]
    impl Capability for Noop {
        async fn invoke(&self, _arguments: JsonMap<String, Value>, _context: &CapabilityContext) -> Result<Value, CapabilityError> {
            Ok(Value::Null)
        }
    }

    fn noop() -> Noop {
        Noop
    }

    fn registry() -> CapabilityRegistry {
        let mut builder = CapabilityRegistry::builder(DuplicatePolicy::Reject);
        builder
            .register(
                "data.fetch",
                noop(),
                Some(
                    CapabilityContract::new("fetch rows")
                        .with_input("account", ValueType::String)
                        .with_optional_input("limit", ValueType::Integer)
                        .with_output("rows", ValueType::Array),
                ),
            )
            .expect("register fetch");
        builder.register("data.transform", noop(), None).expect("register transform");
        builder
            .register(
                "risk.stress",
                noop(),
                Some(CapabilityContract::new("not built yet").with_maturity(Maturity::Placeholder)),
            )
            .expect("register stress");
        builder.build()
    }

    fn step(capability: &str, args: Value, binding: Option<&str>) -> WorkflowStepDefinition {
        WorkflowStepDefinition {
            capability: capability.into(),
            args: args
                .as_object()
                .map(|map| map.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
                .unwrap_or_default(),
            binding: binding.map(str::to_string),
            ..Default::default()
        }
    }

    fn kinds(outcome: &DefinitionOutcome) -> Vec<(DiagnosticKind, Severity)> {
        outcome.diagnostics.iter().map(|diagnostic| (diagnostic.kind, diagnostic.severity)).collect()
    }

    #[test]
    fn accepts_a_well_formed_definition() {
        let definition = WorkflowDefinition {
            workflow: "holdings".into(),
            steps: vec![
                step("data.fetch", json!({"account": "{{ account }}"}), Some("data")),
                step("data.transform", json!({"rows": "{{ data.rows }}"}), Some("result")),
            ],
            outputs: vec!["result".into()],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        assert!(outcome.is_accepted(), "{:?}", outcome.diagnostics);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn unbound_output_rejects_the_definition() {
        let definition = WorkflowDefinition {
            workflow: "broken".into(),
            steps: vec![step("data.fetch", json!({"account": "a"}), Some("data"))],
            outputs: vec!["summary".into()],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        assert!(!outcome.is_accepted());
        assert_eq!(kinds(&outcome), vec![(DiagnosticKind::OutputNotBound, Severity::Error)]);
        assert_eq!(outcome.diagnostics[0].subject.as_deref(), Some("summary"));
    }

    #[test]
    fn declared_inputs_satisfy_outputs() {
        let mut inputs = IndexMap::new();
        inputs.insert("account".to_string(), WorkflowInputDefinition::default());
        let definition = WorkflowDefinition {
            workflow: "passthrough".into(),
            inputs,
            steps: vec![step("data.transform", json!({}), None)],
            outputs: vec!["account".into()],
            ..Default::default()
        };
        assert!(validate_definition(&definition, &registry(), &ValidationConfig::default()).is_accepted());
    }

    #[test]
    fn reports_unknown_capabilities_per_step() {
        let definition = WorkflowDefinition {
            workflow: "unknowns".into(),
            steps: vec![step("data.missing", json!({}), None), step("other.missing", json!({}), None)],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        let steps: Vec<_> = outcome.errors().map(|diagnostic| diagnostic.step).collect();
        assert_eq!(steps, vec![Some(0), Some(1)]);
        assert!(outcome.errors().all(|diagnostic| diagnostic.kind == DiagnosticKind::UnknownCapability));
    }

    #[test]
    fn rejects_duplicate_and_shadowing_bindings() {
        let mut inputs = IndexMap::new();
        inputs.insert("account".to_string(), WorkflowInputDefinition::default());
        let definition = WorkflowDefinition {
            workflow: "dupes".into(),
            inputs,
            steps: vec![
                step("data.transform", json!({}), Some("data")),
                step("data.transform", json!({}), Some("data")),
                step("data.transform", json!({}), Some("account")),
                step("data.transform", json!({}), Some("context")),
            ],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        let found: Vec<_> = outcome.diagnostics.iter().map(|diagnostic| (diagnostic.kind, diagnostic.step)).collect();
        assert_eq!(
            found,
            vec![
                (DiagnosticKind::DuplicateBinding, Some(1)),
                (DiagnosticKind::DuplicateBinding, Some(2)),
                (DiagnosticKind::DuplicateBinding, Some(3)),
            ]
        );
    }

    #[test]
    fn rejects_empty_identifier_and_empty_steps() {
        let outcome = validate_definition(&WorkflowDefinition::default(), &registry(), &ValidationConfig::default());
        let found: Vec<_> = outcome.diagnostics.iter().map(|diagnostic| diagnostic.kind).collect();
        assert_eq!(found, vec![DiagnosticKind::MissingIdentifier, DiagnosticKind::NoSteps]);
    }

    #[test]
    fn rejects_malformed_templates() {
        let definition = WorkflowDefinition {
            workflow: "templates".into(),
            steps: vec![step("data.transform", json!({"value": "{{ data"}), None)],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        assert_eq!(kinds(&outcome), vec![(DiagnosticKind::InvalidTemplate, Severity::Error)]);
    }

    #[test]
    fn rejects_defaults_that_do_not_match_their_type() {
        let mut inputs = IndexMap::new();
        inputs.insert(
            "lookback".to_string(),
            WorkflowInputDefinition {
                r#type: ValueType::Integer,
                default: Some(json!("thirty")),
                ..Default::default()
            },
        );
        let definition = WorkflowDefinition {
            workflow: "defaults".into(),
            inputs,
            steps: vec![step("data.transform", json!({}), None)],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        assert_eq!(kinds(&outcome), vec![(DiagnosticKind::InvalidInputDefault, Severity::Error)]);
    }

    #[test]
    fn contract_findings_are_warnings_by_default() {
        let definition = WorkflowDefinition {
            workflow: "contracts".into(),
            steps: vec![
                step("data.fetch", json!({"limit": "ten"}), Some("data")),
                step("data.fetch", json!({"account": "a", "colour": "blue"}), None),
                step("data.transform", json!({"value": "{{ data.columns }}"}), Some("result")),
                step("risk.stress", json!({}), None),
            ],
            outputs: vec!["result".into()],
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &ValidationConfig::default());
        assert!(outcome.is_accepted());
        let found: Vec<_> = outcome.warnings().map(|diagnostic| (diagnostic.kind, diagnostic.subject.clone())).collect();
        assert_eq!(
            found,
            vec![
                (DiagnosticKind::ContractMismatch, Some("account".to_string())),
                (DiagnosticKind::ContractMismatch, Some("limit".to_string())),
                (DiagnosticKind::ContractMismatch, Some("colour".to_string())),
                (DiagnosticKind::ContractMismatch, Some("data.columns".to_string())),
                (DiagnosticKind::PlaceholderCapability, Some("risk.stress".to_string())),
            ]
        );
    }

    #[test]
    fn configured_error_severity_rejects_contract_findings() {
        let definition = WorkflowDefinition {
            workflow: "strict".into(),
            steps: vec![step("risk.stress", json!({}), None)],
            ..Default::default()
        };
        let config = ValidationConfig {
            placeholder_capability: Severity::Error,
            ..Default::default()
        };
        let outcome = validate_definition(&definition, &registry(), &config);
        assert!(!outcome.is_accepted());
        assert_eq!(kinds(&outcome), vec![(DiagnosticKind::PlaceholderCapability, Severity::Error)]);
    }
}
