//! Validation helpers for caller-supplied input values.
//!
//! Both the run-time validator and the load-time default checks share these
//! rules so a default that passes at load never fails the same check at run.

use serde_json::Value;

use super::WorkflowInputDefinition;

/// Validate a JSON candidate against a declared input.
///
/// Returns a human-readable reason when the candidate does not satisfy the
/// declared type tag.
pub fn validate_input_value(candidate: &Value, definition: &WorkflowInputDefinition) -> Result<(), String> {
    if definition.r#type.accepts(candidate) {
        return Ok(());
    }
    Err(format!("expected a value of type {}, got {}", definition.r#type, describe_json_kind(candidate)))
}

fn describe_json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
