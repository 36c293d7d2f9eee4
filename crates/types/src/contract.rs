//! Capability contracts.
//!
//! A contract describes what a capability expects and returns. Contracts are
//! advisory: the validator reports mismatches with a configurable severity, and
//! documentation tooling renders them, but no runtime type system enforces them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ValueType;

/// Implementation maturity of a capability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    /// Production-ready.
    #[default]
    Implemented,
    /// Works for a subset of inputs.
    Partial,
    /// Returns stub data; workflows depending on it are flagged by the validator.
    Placeholder,
}

/// Declared shape of a capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct CapabilityContract {
    /// Free-text description used by documentation tooling.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maturity: Maturity,
    /// Named arguments the capability accepts.
    #[serde(default)]
    pub inputs: Vec<ContractField>,
    /// Named fields present on the capability's result object.
    #[serde(default)]
    pub outputs: Vec<ContractField>,
}

impl CapabilityContract {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_maturity(mut self, maturity: Maturity) -> Self {
        self.maturity = maturity;
        self
    }

    /// Adds a required input.
    pub fn with_input(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.inputs.push(ContractField::new(name, value_type));
        self
    }

    /// Adds an input the caller may omit.
    pub fn with_optional_input(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        let mut field = ContractField::new(name, value_type);
        field.required = false;
        self.inputs.push(field);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.outputs.push(ContractField::new(name, value_type));
        self
    }

    pub fn input(&self, name: &str) -> Option<&ContractField> {
        self.inputs.iter().find(|field| field.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&ContractField> {
        self.outputs.iter().find(|field| field.name == name)
    }
}

/// A single named, typed field in a contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ContractField {
    pub name: String,
    #[serde(default, rename = "type")]
    pub r#type: ValueType,
    /// Only meaningful for inputs.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractField {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            r#type: value_type,
            required: true,
            description: None,
        }
    }
}

fn default_required() -> bool {
    true
}
