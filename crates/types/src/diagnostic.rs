//! Validation diagnostics produced by the load-time and run-time passes.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How serious a diagnostic is.
///
/// Errors exclude a definition from the runnable set (load time) or abort a run
/// (run time). Warnings are reported and otherwise ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The source document could not be parsed.
    ParseFailure,
    /// The definition has no identifier.
    MissingIdentifier,
    /// Another accepted definition already uses this identifier.
    DuplicateWorkflow,
    /// The definition declares no steps.
    NoSteps,
    /// A step names a capability absent from the registry.
    UnknownCapability,
    /// An output does not name a step binding or declared input.
    OutputNotBound,
    /// A step's `as` name repeats another binding or shadows an input.
    DuplicateBinding,
    /// A template or guard expression is malformed.
    InvalidTemplate,
    /// Step arguments or downstream references disagree with a capability contract.
    ContractMismatch,
    /// A step depends on a capability whose contract is marked placeholder.
    PlaceholderCapability,
    /// A declared input default does not match its type tag.
    InvalidInputDefault,
    /// A template reference is not bound at the point it is used.
    UnresolvedReference,
    /// A required input was not supplied.
    MissingInput,
    /// A supplied input does not match its type tag.
    InvalidInput,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseFailure => "ParseFailure",
            DiagnosticKind::MissingIdentifier => "MissingIdentifier",
            DiagnosticKind::DuplicateWorkflow => "DuplicateWorkflow",
            DiagnosticKind::NoSteps => "NoSteps",
            DiagnosticKind::UnknownCapability => "UnknownCapability",
            DiagnosticKind::OutputNotBound => "OutputNotBound",
            DiagnosticKind::DuplicateBinding => "DuplicateBinding",
            DiagnosticKind::InvalidTemplate => "InvalidTemplate",
            DiagnosticKind::ContractMismatch => "ContractMismatch",
            DiagnosticKind::PlaceholderCapability => "PlaceholderCapability",
            DiagnosticKind::InvalidInputDefault => "InvalidInputDefault",
            DiagnosticKind::UnresolvedReference => "UnresolvedReference",
            DiagnosticKind::MissingInput => "MissingInput",
            DiagnosticKind::InvalidInput => "InvalidInput",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding about a workflow definition or invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Diagnostic {
    /// Workflow identifier, or the document origin when no identifier is known.
    pub workflow: String,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Zero-based step index the finding applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    /// The offending name (capability, binding, output, input, or reference root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(workflow: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(workflow, kind, Severity::Error, message)
    }

    pub fn new(workflow: impl Into<String>, kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            kind,
            severity,
            step: None,
            subject: None,
            message: message.into(),
        }
    }

    pub fn at_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}[{}] {}", self.kind, self.workflow)?;
        if let Some(step) = self.step {
            write!(f, " step {step}")?;
        }
        write!(f, ": {}", self.message)
    }
}
