//! # Patterns Engine
//!
//! The Patterns Engine loads declarative workflow ("pattern") definitions,
//! validates them against a registry of capabilities, and executes them step
//! by step, dispatching each step to the provider registered for its
//! capability.
//!
//! ## Key Features
//!
//! - **Workflow Loading**: YAML/JSON documents holding one definition or a `workflows:` map
//! - **Template Resolution**: `{{ path }}` placeholders resolved against run state
//! - **Guards**: step-level `when` expressions that skip a step when false
//! - **Validation**: load-time checks per definition and run-time checks per invocation
//! - **Cancellation**: cooperative cancellation and per-run timeouts
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use patterns_engine::{
//!     CapabilityRegistry, DuplicatePolicy, FnCapability, InlineSource, Orchestrator, OrchestratorConfig,
//! };
//! use serde_json::{Map, Value, json};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let mut builder = CapabilityRegistry::builder(DuplicatePolicy::Reject);
//! builder.register(
//!     "core.echo",
//!     FnCapability::new(|arguments, _context| async move { Ok(Value::Object(arguments)) }),
//!     None,
//! )?;
//!
//! let orchestrator = Orchestrator::new(Arc::new(builder.build()), OrchestratorConfig::default());
//! orchestrator.load(&InlineSource::new().with_document(
//!     "greet.yaml",
//!     r#"
//! workflow: greet
//! steps:
//!   - capability: core.echo
//!     args: { message: "hello {{ name }}" }
//!     as: greeting
//! outputs: [greeting]
//! "#,
//! ))?;
//!
//! let inputs = json!({ "name": "world" }).as_object().cloned().unwrap_or_default();
//! let outputs = orchestrator.run("greet", inputs, Map::new()).await?;
//! assert_eq!(outputs["greeting"], json!({ "message": "hello world" }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`capability`**: provider trait and the name-keyed registry
//! - **`template`**: placeholder parser and resolver
//! - **`workflow`**: documents, sources, guards, and per-run state
//! - **`validator`**: load-time and run-time validation passes
//! - **`executor`**: compiled plans and sequential step execution
//! - **`orchestrator`**: catalog management and the run facade
//! - **`config`**: orchestrator configuration

use std::path::Path;

use anyhow::Result;
use patterns_types::WorkflowDefinition;

pub mod capability;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod template;
pub mod validator;
pub mod workflow;

// Re-export commonly used types for convenience
pub use capability::{Capability, CapabilityContext, CapabilityRegistry, CapabilityRegistryBuilder, DuplicatePolicy, FnCapability};
pub use config::{OrchestratorConfig, load_config, load_config_from_path};
pub use error::{CapabilityError, RegistryError, RunError, TemplateError};
pub use executor::{RunReport, StepRecord, StepStatus};
pub use orchestrator::{LoadReport, Orchestrator, RejectedDefinition, WorkflowCatalog};
pub use validator::ValidationConfig;
pub use workflow::{
    document::{SourceDocument, parse_document},
    source::{FileSystemSource, InlineSource, WorkflowSource},
};

/// Reads every workflow definition from a file or directory without validating it.
///
/// # Errors
///
/// Returns the first read or parse failure; use [`Orchestrator::load`] to get
/// per-document diagnostics instead.
///
/// # Examples
///
/// ```rust
/// use patterns_engine::parse_workflow_file;
///
/// let temp_dir = tempfile::tempdir()?;
/// let workflow_path = temp_dir.path().join("holdings.yaml");
/// std::fs::write(&workflow_path, r#"
/// workflow: "holdings"
/// steps:
///   - capability: data.fetch
///     as: data
/// outputs: [data]
/// "#)?;
///
/// let definitions = parse_workflow_file(&workflow_path)?;
/// assert_eq!(definitions[0].workflow, "holdings");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse_workflow_file(path: impl AsRef<Path>) -> Result<Vec<WorkflowDefinition>> {
    let source = FileSystemSource::new(path.as_ref());
    let mut definitions = Vec::new();
    for document in source.documents()? {
        definitions.extend(parse_document(&document)?);
    }
    Ok(definitions)
}
