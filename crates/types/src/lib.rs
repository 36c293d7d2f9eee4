//! Shared type definitions for the pattern orchestrator.
//!
//! The workflow document schema, capability contracts, and validation
//! diagnostics live here so the engine, the CLI, and external tooling (linters,
//! documentation generators) agree on a single serialized shape.

pub mod contract;
pub mod diagnostic;
pub mod workflow;

pub use contract::{CapabilityContract, ContractField, Maturity};
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use workflow::{
    ValueType, WorkflowBundle, WorkflowDefinition, WorkflowDocument, WorkflowInputDefinition, WorkflowStepDefinition, validation::validate_input_value,
};
