//! Template resolution against run state.
//!
//! Resolution is a pure function of a compiled [`Template`] and a [`RunState`]:
//! no I/O, no mutation, and the same bindings always produce the same value.

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};

use super::parser::{Fragment, PathSegment, ReferencePath, Template};
use crate::{error::TemplateError, workflow::state::RunState};

/// Resolves a compiled template.
///
/// Whole-value references keep the target's native type; interpolated strings
/// render each reference and concatenate it with the surrounding text.
///
/// ```rust
/// use patterns_engine::{template::{Template, resolve}, workflow::state::RunState};
/// use serde_json::{Map, json};
///
/// let mut state = RunState::new(Map::new(), Map::new());
/// state.bind("data", json!({"rows": [10, 20]}));
///
/// let whole = Template::parse(&json!("{{ data.rows }}")).unwrap();
/// assert_eq!(resolve(&whole, &state).unwrap(), json!([10, 20]));
///
/// let text = Template::parse(&json!("first={{ data.rows[0] }}")).unwrap();
/// assert_eq!(resolve(&text, &state).unwrap(), json!("first=10"));
/// ```
pub fn resolve(template: &Template, state: &RunState) -> Result<Value, TemplateError> {
    match template {
        Template::Literal(value) => Ok(value.clone()),
        Template::Reference(path) => resolve_reference(path, state),
        Template::Interpolated(fragments) => {
            let mut rendered = String::new();
            for fragment in fragments {
                match fragment {
                    Fragment::Text(text) => rendered.push_str(text),
                    Fragment::Reference(path) => rendered.push_str(&render_inline(lookup(path, state)?)),
                }
            }
            Ok(Value::String(rendered))
        }
        Template::Array(items) => items
            .iter()
            .map(|item| resolve(item, state))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Template::Object(map) => {
            let mut resolved = JsonMap::new();
            for (key, item) in map {
                resolved.insert(key.clone(), resolve(item, state)?);
            }
            Ok(Value::Object(resolved))
        }
    }
}

/// Resolves every argument of a step, failing on the first unresolved reference.
pub fn resolve_arguments(arguments: &IndexMap<String, Template>, state: &RunState) -> Result<JsonMap<String, Value>, TemplateError> {
    let mut resolved = JsonMap::new();
    for (name, template) in arguments {
        resolved.insert(name.clone(), resolve(template, state)?);
    }
    Ok(resolved)
}

/// Resolves a single reference path to a cloned value.
pub fn resolve_reference(path: &ReferencePath, state: &RunState) -> Result<Value, TemplateError> {
    lookup(path, state).cloned()
}

fn lookup<'a>(path: &ReferencePath, state: &'a RunState) -> Result<&'a Value, TemplateError> {
    let unresolved = |segment: String| TemplateError::UnresolvedReference {
        reference: path.as_str().to_string(),
        segment,
        available: state.available_names(),
    };

    let mut current = state.get(path.root()).ok_or_else(|| unresolved(path.root().to_string()))?;
    for segment in path.segments() {
        let next = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Key(key), Value::Array(items)) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        };
        current = next.ok_or_else(|| unresolved(segment.to_string()))?;
    }
    Ok(current)
}

/// Renders a value for inclusion in interpolated text: strings raw, everything else as compact JSON.
fn render_inline(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> RunState {
        let inputs = json!({"client": "acme", "limit": 5}).as_object().cloned().expect("inputs");
        let context = json!({"as_of": "2024-03-31", "user": "ops"}).as_object().cloned().expect("context");
        let mut state = RunState::new(inputs, context);
        state.bind(
            "positions",
            json!({"items": [{"symbol": "AAA", "qty": 10}, {"symbol": "BBB", "qty": 4.5}], "count": 2}),
        );
        state
    }

    fn resolve_json(raw: Value) -> Result<Value, TemplateError> {
        resolve(&Template::parse(&raw).expect("parse"), &state())
    }

    #[test]
    fn whole_value_keeps_native_types() {
        assert_eq!(resolve_json(json!("{{ positions.count }}")).expect("count"), json!(2));
        assert_eq!(resolve_json(json!("{{ positions.items[1].qty }}")).expect("qty"), json!(4.5));
        assert_eq!(resolve_json(json!("{{positions.items.0}}")).expect("item"), json!({"symbol": "AAA", "qty": 10}));
        assert_eq!(resolve_json(json!("{{ limit }}")).expect("input"), json!(5));
        assert_eq!(resolve_json(json!("{{ inputs.client }}")).expect("inputs root"), json!("acme"));
    }

    #[test]
    fn interpolation_stringifies_and_concatenates() {
        assert_eq!(
            resolve_json(json!("{{ client }} holds {{ positions.count }} as of {{ context.as_of }}")).expect("text"),
            json!("acme holds 2 as of 2024-03-31")
        );
        assert_eq!(
            resolve_json(json!("first: {{ positions.items[0] }}")).expect("object inline"),
            json!(format!("first: {}", json!({"symbol": "AAA", "qty": 10})))
        );
    }

    #[test]
    fn containers_resolve_recursively() {
        let resolved = resolve_json(json!({
            "symbols": ["{{ positions.items[0].symbol }}", "{{ positions.items[1].symbol }}"],
            "owner": {"name": "{{ context.user }}", "fixed": true}
        }))
        .expect("container");
        assert_eq!(resolved, json!({"symbols": ["AAA", "BBB"], "owner": {"name": "ops", "fixed": true}}));
    }

    #[test]
    fn missing_root_names_segment_and_available_set() {
        let error = resolve_json(json!("{{ result.x }}")).expect_err("unbound");
        assert_eq!(
            error,
            TemplateError::UnresolvedReference {
                reference: "result.x".into(),
                segment: "result".into(),
                available: vec![
                    "client".into(),
                    "context".into(),
                    "inputs".into(),
                    "limit".into(),
                    "positions".into()
                ],
            }
        );
    }

    #[test]
    fn missing_nested_segment_is_named() {
        let error = resolve_json(json!("{{ positions.items[7].symbol }}")).expect_err("out of range");
        assert!(matches!(error, TemplateError::UnresolvedReference { ref segment, .. } if segment == "[7]"));

        let error = resolve_json(json!("{{ positions.count.value }}")).expect_err("scalar");
        assert!(matches!(error, TemplateError::UnresolvedReference { ref segment, .. } if segment == "value"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let template = Template::parse(&json!({"a": "{{ positions }}", "b": "n={{ limit }}"})).expect("parse");
        let state = state();
        assert_eq!(resolve(&template, &state).expect("first"), resolve(&template, &state).expect("second"));
    }
}
