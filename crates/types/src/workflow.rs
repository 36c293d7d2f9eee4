//! Strongly typed workflow schema definitions shared across the engine and CLI.
//!
//! Definitions preserve authoring order (via `IndexMap`) so that introspection
//! reflects exactly what was loaded: inputs, steps, and outputs come back in the
//! order they were written.

use std::fmt;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// A declarative document holding one or more workflow definitions.
///
/// Documents come in two shapes: a single definition at the top level, or a
/// `workflows:` map keyed by identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum WorkflowDocument {
    /// Multiple definitions keyed by workflow identifier.
    Bundle(WorkflowBundle),
    /// A single definition.
    Single(WorkflowDefinition),
}

/// The `workflows:` form of a document.
///
/// A definition inside a bundle may omit `workflow`; the map key names it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkflowBundle {
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

/// Describes a fully authored workflow: identifier, inputs, ordered steps, and outputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinition {
    /// Canonical workflow identifier (for example, `portfolio_overview`).
    #[serde(default)]
    pub workflow: String,
    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional descriptive copy surfaced by documentation tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared input parameters keyed by name, preserving author order.
    #[serde(default)]
    pub inputs: IndexMap<String, WorkflowInputDefinition>,
    /// Ordered list of steps executed sequentially.
    #[serde(default)]
    pub steps: Vec<WorkflowStepDefinition>,
    /// Binding names projected into the run result.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl WorkflowDefinition {
    /// Returns the title when present, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(&self.workflow)
    }

    /// Iterates over the `as` names declared by the steps, in step order.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| step.binding.as_deref())
    }
}

/// Metadata for a single declared input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkflowInputDefinition {
    /// Descriptive text explaining the purpose of the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared value type; `any` accepts every JSON value.
    #[serde(default, rename = "type")]
    pub r#type: ValueType,
    /// When true, the input may be omitted by the caller. Inputs are required by default.
    #[serde(default)]
    pub optional: bool,
    /// Value used when the caller omits the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl WorkflowInputDefinition {
    /// True when the caller must supply a value (no default, not optional).
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// One capability invocation within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkflowStepDefinition {
    /// Namespaced capability name, for example `pricing.fetch_quotes`.
    pub capability: String,
    /// Optional descriptive label for logs and documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Argument map; values are literals or `{{ ... }}` templates.
    #[serde(default, alias = "with")]
    pub args: IndexMap<String, JsonValue>,
    /// Name under which the step's result is stored in run state.
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    /// Guard expression; the step is skipped when it evaluates falsy.
    #[serde(default, alias = "if", skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// Type tags understood by input declarations and capability contracts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl ValueType {
    /// Returns true when `value` conforms to this type tag.
    ///
    /// `null` is only accepted by `any`; optional values are expressed by omission.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
            ValueType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Any => "any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_definition_round_trips_through_yaml() {
        let yaml = r#"
workflow: portfolio_overview
inputs:
  portfolio_id:
    type: string
  lookback_days:
    type: integer
    default: 30
steps:
  - capability: ledger.positions
    args:
      portfolio: "{{ portfolio_id }}"
    as: positions
  - capability: pricing.valuate
    with:
      holdings: "{{ positions.items }}"
    as: valuation
    if: "positions.items"
outputs: [valuation]
"#;
        let document: WorkflowDocument = serde_yaml::from_str(yaml).expect("parse document");
        let WorkflowDocument::Single(definition) = document else {
            panic!("expected single definition");
        };
        assert_eq!(definition.workflow, "portfolio_overview");
        assert_eq!(definition.inputs.keys().collect::<Vec<_>>(), vec!["portfolio_id", "lookback_days"]);
        assert!(definition.inputs["portfolio_id"].is_required());
        assert!(!definition.inputs["lookback_days"].is_required());
        assert_eq!(definition.steps[1].args["holdings"], json!("{{ positions.items }}"));
        assert_eq!(definition.steps[1].when.as_deref(), Some("positions.items"));
        assert_eq!(definition.binding_names().collect::<Vec<_>>(), vec!["positions", "valuation"]);

        let serialized = serde_yaml::to_string(&definition).expect("serialize");
        let reparsed: WorkflowDefinition = serde_yaml::from_str(&serialized).expect("reparse");
        assert_eq!(reparsed, definition);
    }

    #[test]
    fn bundle_document_is_recognized() {
        let yaml = r#"
workflows:
  first:
    steps: []
  second:
    steps: []
"#;
        let document: WorkflowDocument = serde_yaml::from_str(yaml).expect("parse bundle");
        match document {
            WorkflowDocument::Bundle(bundle) => {
                assert_eq!(bundle.workflows.keys().collect::<Vec<_>>(), vec!["first", "second"]);
            }
            WorkflowDocument::Single(_) => panic!("expected bundle"),
        }
    }

    #[test]
    fn bundle_with_stray_top_level_keys_is_not_a_bundle() {
        let yaml = r#"
workflows:
  first:
    steps: []
version: 2
"#;
        assert!(serde_yaml::from_str::<WorkflowBundle>(yaml).is_err());
        assert!(serde_yaml::from_str::<WorkflowDocument>(yaml).is_err());
    }

    #[test]
    fn display_name_prefers_a_non_blank_title() {
        let mut definition = WorkflowDefinition {
            workflow: "portfolio_overview".into(),
            title: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(definition.display_name(), "portfolio_overview");
        definition.title = Some("Portfolio overview".into());
        assert_eq!(definition.display_name(), "Portfolio overview");
    }

    #[test]
    fn unknown_step_fields_are_rejected() {
        let yaml = r#"
capability: ledger.positions
argz: {}
"#;
        assert!(serde_yaml::from_str::<WorkflowStepDefinition>(yaml).is_err());
    }

    #[test]
    fn value_type_acceptance() {
        assert!(ValueType::Integer.accepts(&json!(3)));
        assert!(!ValueType::Integer.accepts(&json!(3.5)));
        assert!(ValueType::Number.accepts(&json!(3.5)));
        assert!(!ValueType::String.accepts(&json!(null)));
        assert!(ValueType::Any.accepts(&json!(null)));
    }
}
