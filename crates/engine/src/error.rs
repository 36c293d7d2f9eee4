//! Error taxonomy for registry, template, capability, and run failures.

use patterns_types::Diagnostic;
use thiserror::Error;

/// Failures raised while building or querying the capability registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability '{name}' is not registered")]
    UnknownCapability { name: String },

    #[error("capability '{name}' is already registered")]
    DuplicateCapability { name: String },

    #[error("invalid contract for capability '{name}': {reason}")]
    InvalidContract { name: String, reason: String },

    #[error("invalid capability name '{name}': expected a namespaced name such as 'domain.action'")]
    InvalidCapabilityName { name: String },
}

/// Failures raised while parsing or resolving template expressions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid template '{template}': {reason}")]
    Invalid { template: String, reason: String },

    #[error("unresolved reference '{reference}': segment '{segment}' not found (available: {})", join_names(.available))]
    UnresolvedReference {
        /// Full reference text as written in the template.
        reference: String,
        /// The path segment that could not be resolved.
        segment: String,
        /// Top-level binding names available at the point of resolution.
        available: Vec<String>,
    },
}

impl TemplateError {
    pub(crate) fn invalid(template: impl Into<String>, reason: impl Into<String>) -> Self {
        TemplateError::Invalid {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a capability implementation.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CapabilityError {
    pub fn failed(message: impl Into<String>) -> Self {
        CapabilityError::Failed(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        CapabilityError::InvalidArguments(message.into())
    }
}

/// Structured failure of a single workflow run.
///
/// `Cancelled` and `TimedOut` are distinct from `ProviderFailure` so callers can
/// tell "the work was wrong" apart from "we stopped waiting".
#[derive(Debug, Error)]
pub enum RunError {
    #[error("workflow '{name}' is not defined")]
    UnknownWorkflow { name: String },

    #[error("workflow '{name}' is unavailable: {}", summarize(.diagnostics))]
    WorkflowUnavailable { name: String, diagnostics: Vec<Diagnostic> },

    #[error("workflow '{workflow}' failed validation with {} violation(s): {}", .violations.len(), summarize(.violations))]
    Validation { workflow: String, violations: Vec<Diagnostic> },

    #[error("step {step} ('{capability}') could not be prepared: {source}")]
    UnresolvedReference {
        step: usize,
        capability: String,
        source: TemplateError,
    },

    #[error("step {step} ('{capability}') could not be dispatched: {source}")]
    Dispatch {
        step: usize,
        capability: String,
        source: RegistryError,
    },

    #[error("step {step} ('{capability}') failed: {cause}")]
    ProviderFailure {
        step: usize,
        capability: String,
        #[source]
        cause: CapabilityError,
    },

    #[error("workflow '{workflow}' was cancelled at step {step}")]
    Cancelled { workflow: String, step: usize },

    #[error("workflow '{workflow}' timed out after {timeout_ms}ms")]
    TimedOut { workflow: String, timeout_ms: u64 },
}

impl RunError {
    /// Index of the step the failure is attributed to, when there is one.
    pub fn step(&self) -> Option<usize> {
        match self {
            RunError::UnresolvedReference { step, .. }
            | RunError::Dispatch { step, .. }
            | RunError::ProviderFailure { step, .. }
            | RunError::Cancelled { step, .. } => Some(*step),
            _ => None,
        }
    }
}

fn join_names(names: &[String]) -> String {
    if names.is_empty() { "<none>".to_string() } else { names.join(", ") }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| diagnostic.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
