//! Per-run binding state.
//!
//! A [`RunState`] is created at the start of a run, seeded with the caller's
//! inputs and the read-only invocation context, grows by one binding per
//! completed step, and is dropped when the run ends. It is never shared
//! between runs and never handed to providers.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};

/// Reserved root exposing the full input map (`{{ inputs.name }}`).
pub const INPUTS_ROOT: &str = "inputs";
/// Reserved root exposing the invocation context (`{{ context.as_of }}`).
pub const CONTEXT_ROOT: &str = "context";

/// Returns true for names that step bindings and inputs may not use.
pub fn is_reserved_name(name: &str) -> bool {
    name == INPUTS_ROOT || name == CONTEXT_ROOT
}

/// Mutable mapping from binding name to value for a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    bindings: IndexMap<String, Value>,
}

impl RunState {
    /// Seeds state with inputs (top level and under `inputs`) and context (under `context`).
    pub fn new(inputs: JsonMap<String, Value>, context: JsonMap<String, Value>) -> Self {
        let mut bindings = IndexMap::with_capacity(inputs.len() + 2);
        for (name, value) in &inputs {
            if !is_reserved_name(name) {
                bindings.insert(name.clone(), value.clone());
            }
        }
        bindings.insert(INPUTS_ROOT.to_string(), Value::Object(inputs));
        bindings.insert(CONTEXT_ROOT.to_string(), Value::Object(context));
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Commits a step result under `name`.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Top-level binding names, sorted for stable diagnostics.
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }

    /// Projects the named bindings into an output map.
    ///
    /// Returns the projected map and the names that had no binding (for
    /// example, outputs of steps skipped by their guard).
    pub fn project(&self, outputs: &[String]) -> (JsonMap<String, Value>, Vec<String>) {
        let mut projected = JsonMap::new();
        let mut unbound = Vec::new();
        for name in outputs {
            match self.bindings.get(name) {
                Some(value) => {
                    projected.insert(name.clone(), value.clone());
                }
                None => {
                    projected.insert(name.clone(), Value::Null);
                    unbound.push(name.clone());
                }
            }
        }
        (projected, unbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeds_inputs_and_context_roots() {
        let inputs = json!({"account": "A-1"}).as_object().cloned().expect("inputs");
        let context = json!({"as_of": "2024-01-01"}).as_object().cloned().expect("context");
        let state = RunState::new(inputs, context);

        assert_eq!(state.get("account"), Some(&json!("A-1")));
        assert_eq!(state.get(INPUTS_ROOT), Some(&json!({"account": "A-1"})));
        assert_eq!(state.get(CONTEXT_ROOT), Some(&json!({"as_of": "2024-01-01"})));
        assert!(state.get("as_of").is_none(), "context fields are only reachable under the context root");
        assert_eq!(state.available_names(), vec!["account", "context", "inputs"]);
    }

    #[test]
    fn reserved_input_names_do_not_shadow_roots() {
        let inputs = json!({"context": "spoofed"}).as_object().cloned().expect("inputs");
        let state = RunState::new(inputs, JsonMap::new());
        assert_eq!(state.get(CONTEXT_ROOT), Some(&json!({})));
    }

    #[test]
    fn projection_reports_unbound_outputs() {
        let mut state = RunState::new(JsonMap::new(), JsonMap::new());
        state.bind("result", json!([1, 2]));
        let (outputs, unbound) = state.project(&["result".to_string(), "skipped".to_string()]);
        assert_eq!(Value::Object(outputs), json!({"result": [1, 2], "skipped": null}));
        assert_eq!(unbound, vec!["skipped"]);
    }
}
