//! Workflow document parsing.
//!
//! A document is YAML or JSON (JSON parses as YAML) holding either one
//! definition at the top level or a `workflows:` map keyed by identifier.

use anyhow::{Context, Result, bail};
use patterns_types::{WorkflowBundle, WorkflowDefinition, WorkflowDocument};

/// Raw document text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Human-readable origin (file path, database key, URL).
    pub origin: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            content: content.into(),
        }
    }
}

/// Parses every definition in a document, preserving authoring order.
///
/// Bundle keys become identifiers for definitions that omit `workflow`; a
/// definition whose `workflow` disagrees with its key is an error.
pub fn parse_document(document: &SourceDocument) -> Result<Vec<WorkflowDefinition>> {
    let raw: serde_yaml::Value =
        serde_yaml::from_str(&document.content).with_context(|| format!("failed to parse workflow document {}", document.origin))?;

    let is_bundle = match &raw {
        serde_yaml::Value::Mapping(mapping) => mapping.contains_key("workflows"),
        serde_yaml::Value::Null => bail!("workflow document {} is empty", document.origin),
        _ => bail!("workflow document {} must be a mapping", document.origin),
    };

    // Untagged deserialization would hide which field failed.
    let parsed = if is_bundle {
        WorkflowDocument::Bundle(
            serde_yaml::from_value::<WorkflowBundle>(raw).with_context(|| format!("invalid workflow bundle in {}", document.origin))?,
        )
    } else {
        WorkflowDocument::Single(
            serde_yaml::from_value::<WorkflowDefinition>(raw)
                .with_context(|| format!("invalid workflow definition in {}", document.origin))?,
        )
    };
    into_definitions(parsed, &document.origin)
}

fn into_definitions(document: WorkflowDocument, origin: &str) -> Result<Vec<WorkflowDefinition>> {
    let bundle = match document {
        WorkflowDocument::Single(definition) => return Ok(vec![definition]),
        WorkflowDocument::Bundle(bundle) => bundle,
    };
    let mut definitions = Vec::with_capacity(bundle.workflows.len());
    for (key, mut definition) in bundle.workflows {
        if definition.workflow.trim().is_empty() {
            definition.workflow = key;
        } else if definition.workflow != key {
            bail!("workflow '{}' in {} is declared under the mismatched key '{}'", definition.workflow, origin, key);
        }
        definitions.push(definition);
    }
    Ok(definitions)
}
