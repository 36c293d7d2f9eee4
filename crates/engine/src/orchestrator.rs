//! Top-level facade: load workflow catalogs, introspect them, and run them.

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use patterns_types::{Diagnostic, DiagnosticKind, WorkflowDefinition};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    capability::CapabilityRegistry,
    config::OrchestratorConfig,
    error::RunError,
    executor::{CompiledWorkflow, RunReport, StepExecutor, run_id_for},
    validator::{lint_references, validate_definition, validate_invocation},
    workflow::{
        document::{SourceDocument, parse_document},
        source::WorkflowSource,
    },
};

/// A definition that passed load-time validation, with its advisory findings.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub workflow: Arc<CompiledWorkflow>,
    pub warnings: Vec<Diagnostic>,
}

/// Immutable snapshot of loaded workflows.
///
/// Runs hold an `Arc` to the snapshot they started with, so a reload never
/// changes a run in flight.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    accepted: BTreeMap<String, CatalogEntry>,
    rejected: BTreeMap<String, Vec<Diagnostic>>,
}

impl WorkflowCatalog {
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.accepted.get(name)
    }

    /// Accepted workflow identifiers, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accepted.keys().map(String::as_str)
    }

    /// Diagnostics of a rejected definition or document.
    pub fn rejection(&self, name: &str) -> Option<&[Diagnostic]> {
        self.rejected.get(name).map(Vec::as_slice)
    }

    fn runnable(&self, name: &str) -> Result<Arc<CompiledWorkflow>, RunError> {
        if let Some(entry) = self.accepted.get(name) {
            return Ok(Arc::clone(&entry.workflow));
        }
        match self.rejected.get(name) {
            Some(diagnostics) => Err(RunError::WorkflowUnavailable {
                name: name.to_string(),
                diagnostics: diagnostics.clone(),
            }),
            None => Err(RunError::UnknownWorkflow { name: name.to_string() }),
        }
    }
}

/// A definition or document excluded from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedDefinition {
    /// Workflow identifier, or the document origin when the document did not parse.
    pub workflow: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of a catalog load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Identifiers that became runnable, in load order.
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedDefinition>,
    /// Warning diagnostics of accepted definitions.
    pub warnings: Vec<Diagnostic>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.warnings.is_empty()
    }
}

/// Loads, validates, and runs workflows against a shared capability registry.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    catalog: RwLock<Arc<WorkflowCatalog>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<CapabilityRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            catalog: RwLock::new(Arc::new(WorkflowCatalog::default())),
            config,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<WorkflowCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reads every document from `source` and publishes a new catalog.
    ///
    /// # Errors
    /// Only when the source itself cannot be read. Malformed documents and
    /// invalid definitions are reported in the returned [`LoadReport`].
    pub fn load(&self, source: &dyn WorkflowSource) -> Result<LoadReport> {
        let documents = source
            .documents()
            .with_context(|| format!("failed to read workflow source {}", source.describe()))?;
        info!(source = %source.describe(), documents = documents.len(), "loading workflows");
        Ok(self.load_documents(documents))
    }

    /// Validates `documents` and atomically replaces the catalog with the result.
    ///
    /// One bad document or definition never blocks the others.
    pub fn load_documents(&self, documents: Vec<SourceDocument>) -> LoadReport {
        let mut catalog = WorkflowCatalog::default();
        let mut report = LoadReport::default();

        for document in documents {
            let definitions = match parse_document(&document) {
                Ok(definitions) => definitions,
                Err(error) => {
                    let diagnostic = Diagnostic::error(document.origin.clone(), DiagnosticKind::ParseFailure, format!("{error:#}"));
                    warn!(origin = %document.origin, error = %diagnostic.message, "workflow document rejected");
                    reject(&mut catalog, &mut report, document.origin, vec![diagnostic]);
                    continue;
                }
            };

            for definition in definitions {
                let outcome = validate_definition(&definition, &self.registry, &self.config.validation);
                let mut diagnostics = outcome.diagnostics;
                let name = if definition.workflow.trim().is_empty() {
                    document.origin.clone()
                } else {
                    definition.workflow.clone()
                };

                let workflow = match outcome.workflow {
                    Some(_) if catalog.accepted.contains_key(&name) => {
                        diagnostics.push(Diagnostic::error(
                            name.clone(),
                            DiagnosticKind::DuplicateWorkflow,
                            format!("workflow '{name}' is already defined; the definition in {} was ignored", document.origin),
                        ));
                        None
                    }
                    other => other,
                };

                for diagnostic in &diagnostics {
                    if diagnostic.is_error() {
                        warn!(workflow = %name, diagnostic = %diagnostic, "definition error");
                    } else {
                        warn!(workflow = %name, diagnostic = %diagnostic, "definition warning");
                    }
                }

                match workflow {
                    Some(workflow) => {
                        report.accepted.push(name.clone());
                        report.warnings.extend(diagnostics.iter().cloned());
                        catalog.accepted.insert(
                            name,
                            CatalogEntry {
                                workflow: Arc::new(workflow),
                                warnings: diagnostics,
                            },
                        );
                    }
                    None => {
                        // A later duplicate must not hide the accepted definition.
                        if catalog.accepted.contains_key(&name) {
                            report.rejected.push(RejectedDefinition { workflow: name, diagnostics });
                        } else {
                            reject(&mut catalog, &mut report, name, diagnostics);
                        }
                    }
                }
            }
        }

        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            warnings = report.warnings.len(),
            "workflow catalog published"
        );
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        report
    }

    /// Identifiers of runnable workflows, sorted.
    pub fn list_workflows(&self) -> Vec<String> {
        self.catalog().names().map(str::to_string).collect()
    }

    /// The loaded definition of a runnable workflow.
    pub fn describe_workflow(&self, name: &str) -> Option<WorkflowDefinition> {
        self.catalog().get(name).map(|entry| entry.workflow.definition.clone())
    }

    /// Diagnostics for one workflow, or for the whole catalog when `name` is `None`.
    ///
    /// Includes load-time findings plus a static reference check of accepted
    /// workflows against their declared inputs.
    pub fn validate(&self, name: Option<&str>) -> Result<Vec<Diagnostic>, RunError> {
        let catalog = self.catalog();
        let Some(name) = name else {
            let mut diagnostics: Vec<Diagnostic> = catalog.rejected.values().flatten().cloned().collect();
            for entry in catalog.accepted.values() {
                diagnostics.extend(entry.warnings.iter().cloned());
                diagnostics.extend(lint_references(&entry.workflow));
            }
            return Ok(diagnostics);
        };

        match catalog.get(name) {
            Some(entry) => {
                let mut diagnostics = entry.warnings.clone();
                diagnostics.extend(lint_references(&entry.workflow));
                Ok(diagnostics)
            }
            None => match catalog.rejection(name) {
                Some(diagnostics) => Ok(diagnostics.to_vec()),
                None => Err(RunError::UnknownWorkflow { name: name.to_string() }),
            },
        }
    }

    /// Runs `name` and returns its projected outputs.
    pub async fn run(
        &self,
        name: &str,
        inputs: JsonMap<String, Value>,
        context: JsonMap<String, Value>,
    ) -> Result<JsonMap<String, Value>, RunError> {
        self.run_with_cancellation(name, inputs, context, CancellationToken::new())
            .await
            .map(|report| report.outputs)
    }

    /// Runs `name` under `cancellation` and the configured timeout.
    ///
    /// Run-time validation completes before any provider is invoked; every
    /// violation is returned together in [`RunError::Validation`].
    pub async fn run_with_cancellation(
        &self,
        name: &str,
        inputs: JsonMap<String, Value>,
        context: JsonMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<RunReport, RunError> {
        let workflow = self.catalog().runnable(name)?;

        let inputs = validate_invocation(&workflow, &inputs).map_err(|violations| {
            warn!(workflow = %name, violations = violations.len(), "run rejected by validation");
            RunError::Validation {
                workflow: name.to_string(),
                violations,
            }
        })?;

        let run_id = run_id_for(&context);
        let token = cancellation.child_token();
        let executor = StepExecutor::new(&self.registry);
        let execution = executor.execute(&workflow, inputs, context, run_id, token.clone());

        let Some(timeout_ms) = self.config.run_timeout_ms else {
            return execution.await;
        };
        match tokio::time::timeout(Duration::from_millis(timeout_ms), execution).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                warn!(workflow = %name, timeout_ms, "run timed out");
                Err(RunError::TimedOut {
                    workflow: name.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}

fn reject(catalog: &mut WorkflowCatalog, report: &mut LoadReport, name: String, diagnostics: Vec<Diagnostic>) {
    report.rejected.push(RejectedDefinition {
        workflow: name.clone(),
        diagnostics: diagnostics.clone(),
    });
    catalog.rejected.entry(name).or_default().extend(diagnostics);
}
