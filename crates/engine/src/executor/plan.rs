//! Compiled workflow plans.
//!
//! Compilation parses every argument template and guard once, so a run never
//! re-parses text and a malformed expression is caught at load time.

use indexmap::IndexMap;
use patterns_types::{Diagnostic, DiagnosticKind, WorkflowDefinition};

use crate::{
    error::TemplateError,
    template::{ReferencePath, Template},
    workflow::condition::Condition,
};

/// A step with its templates and guard parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStep {
    /// Zero-based position in the workflow.
    pub index: usize,
    pub capability: String,
    pub arguments: IndexMap<String, Template>,
    pub binding: Option<String>,
    pub guard: Option<Condition>,
}

impl CompiledStep {
    /// References read by the guard followed by references read by the arguments.
    pub fn references(&self) -> Vec<&ReferencePath> {
        let mut references = self.guard.as_ref().map(Condition::references).unwrap_or_default();
        references.extend(self.arguments.values().flat_map(Template::references));
        references
    }
}

/// A validated definition paired with its compiled steps.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWorkflow {
    pub definition: WorkflowDefinition,
    pub steps: Vec<CompiledStep>,
}

impl CompiledWorkflow {
    /// Compiles every step, collecting one diagnostic per malformed expression.
    pub fn compile(definition: &WorkflowDefinition) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let mut steps = Vec::with_capacity(definition.steps.len());

        for (index, step) in definition.steps.iter().enumerate() {
            let mut arguments = IndexMap::with_capacity(step.args.len());
            for (name, value) in &step.args {
                match Template::parse(value) {
                    Ok(template) => {
                        arguments.insert(name.clone(), template);
                    }
                    Err(error) => diagnostics.push(template_diagnostic(definition, index, &format!("argument '{name}'"), error)),
                }
            }

            let guard = match step.when.as_deref().map(Condition::parse).transpose() {
                Ok(guard) => guard,
                Err(error) => {
                    diagnostics.push(template_diagnostic(definition, index, "guard", error));
                    None
                }
            };

            steps.push(CompiledStep {
                index,
                capability: step.capability.clone(),
                arguments,
                binding: step.binding.clone(),
                guard,
            });
        }

        if diagnostics.is_empty() {
            Ok(Self {
                definition: definition.clone(),
                steps,
            })
        } else {
            Err(diagnostics)
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.workflow
    }
}

fn template_diagnostic(definition: &WorkflowDefinition, index: usize, location: &str, error: TemplateError) -> Diagnostic {
    Diagnostic::error(
        definition.workflow.clone(),
        DiagnosticKind::InvalidTemplate,
        format!("step {index} ('{}') {location}: {error}", definition.steps[index].capability),
    )
    .at_step(index)
}
