//! Template parsing.
//!
//! Argument values are compiled once, at load time, into a [`Template`] tree so
//! resolution never scans strings. Grammar:
//!
//! ```text
//! text        := (literal | escaped | placeholder)*
//! escaped     := "\{{"
//! placeholder := "{{" ws path ws "}}"
//! path        := key ( "." (key | index) | "[" index "]" )*
//! key         := [A-Za-z0-9_-]+
//! index       := [0-9]+
//! ```
//!
//! `\{{` yields a literal `{{` and does not open a placeholder.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::TemplateError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const ESCAPE: char = '\\';

/// One step of navigation into a bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key; also indexes arrays when numeric (`rows.0`).
    Key(String),
    /// Bracketed array index (`rows[0]`).
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A parsed `name.field[0].sub` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    raw: String,
    root: String,
    segments: Vec<PathSegment>,
}

impl ReferencePath {
    /// Parses a bare path expression (no `{{ }}` delimiters).
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TemplateError::invalid(raw, "empty reference"));
        }

        let mut chars = trimmed.char_indices().peekable();
        let mut root = String::new();
        while let Some(&(_, character)) = chars.peek() {
            if !is_key_char(character) {
                break;
            }
            root.push(character);
            chars.next();
        }
        if root.is_empty() {
            return Err(TemplateError::invalid(raw, "reference must start with a binding name"));
        }

        let mut segments = Vec::new();
        while let Some((position, character)) = chars.next() {
            match character {
                '.' => {
                    let mut key = String::new();
                    while let Some(&(_, next)) = chars.peek() {
                        if !is_key_char(next) {
                            break;
                        }
                        key.push(next);
                        chars.next();
                    }
                    if key.is_empty() {
                        return Err(TemplateError::invalid(raw, format!("empty path segment at offset {position}")));
                    }
                    segments.push(PathSegment::Key(key));
                }
                '[' => {
                    let mut digits = String::new();
                    let mut closed = false;
                    for (_, next) in chars.by_ref() {
                        if next == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(next);
                    }
                    if !closed {
                        return Err(TemplateError::invalid(raw, "unterminated '[' in reference"));
                    }
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| TemplateError::invalid(raw, format!("'{digits}' is not a valid index")))?;
                    segments.push(PathSegment::Index(index));
                }
                other => {
                    return Err(TemplateError::invalid(raw, format!("unexpected character '{other}' at offset {position}")));
                }
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            root,
            segments,
        })
    }

    /// The first path segment: the binding name that must be available.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments after the root.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Reference(ReferencePath),
}

/// Compiled form of an argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Passed through unchanged.
    Literal(Value),
    /// The whole value is a single placeholder; resolves to the native type.
    Reference(ReferencePath),
    /// Text with embedded placeholders; resolves to a string.
    Interpolated(Vec<Fragment>),
    Array(Vec<Template>),
    Object(IndexMap<String, Template>),
}

impl Template {
    /// Compiles a JSON argument value, descending into arrays and objects.
    pub fn parse(value: &Value) -> Result<Self, TemplateError> {
        match value {
            Value::String(text) => parse_text(text),
            Value::Array(items) => {
                let templates = items.iter().map(Template::parse).collect::<Result<Vec<_>, _>>()?;
                if templates.iter().all(Template::is_literal) {
                    Ok(Template::Literal(value.clone()))
                } else {
                    Ok(Template::Array(templates))
                }
            }
            Value::Object(map) => {
                let mut templates = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    templates.insert(key.clone(), Template::parse(item)?);
                }
                if templates.values().all(Template::is_literal) {
                    Ok(Template::Literal(value.clone()))
                } else {
                    Ok(Template::Object(templates))
                }
            }
            other => Ok(Template::Literal(other.clone())),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Template::Literal(_))
    }

    /// Every reference in the tree, in document order.
    pub fn references(&self) -> Vec<&ReferencePath> {
        let mut references = Vec::new();
        self.collect_references(&mut references);
        references
    }

    fn collect_references<'a>(&'a self, references: &mut Vec<&'a ReferencePath>) {
        match self {
            Template::Literal(_) => {}
            Template::Reference(path) => references.push(path),
            Template::Interpolated(fragments) => {
                for fragment in fragments {
                    if let Fragment::Reference(path) = fragment {
                        references.push(path);
                    }
                }
            }
            Template::Array(items) => items.iter().for_each(|item| item.collect_references(references)),
            Template::Object(map) => map.values().for_each(|item| item.collect_references(references)),
        }
    }
}

fn parse_text(text: &str) -> Result<Template, TemplateError> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut remaining = text;

    while let Some(start) = remaining.find(OPEN) {
        let (before, after_open) = remaining.split_at(start);
        let after_open = &after_open[OPEN.len()..];
        if let Some(escaped) = before.strip_suffix(ESCAPE) {
            literal.push_str(escaped);
            literal.push_str(OPEN);
            remaining = after_open;
            continue;
        }
        literal.push_str(before);
        let Some(end) = after_open.find(CLOSE) else {
            return Err(TemplateError::invalid(text, "unterminated '{{' placeholder"));
        };
        let expression = &after_open[..end];
        if expression.trim().is_empty() {
            return Err(TemplateError::invalid(text, "empty placeholder"));
        }
        let path = ReferencePath::parse(expression).map_err(|error| match error {
            TemplateError::Invalid { reason, .. } => TemplateError::invalid(text, reason),
            other => other,
        })?;
        if !literal.is_empty() {
            fragments.push(Fragment::Text(std::mem::take(&mut literal)));
        }
        fragments.push(Fragment::Reference(path));
        remaining = &after_open[end + CLOSE.len()..];
    }
    literal.push_str(remaining);
    if !literal.is_empty() {
        fragments.push(Fragment::Text(literal));
    }

    match fragments.as_slice() {
        [] => Ok(Template::Literal(Value::String(String::new()))),
        [Fragment::Text(literal)] => Ok(Template::Literal(Value::String(literal.clone()))),
        [Fragment::Reference(path)] => Ok(Template::Reference(path.clone())),
        _ => Ok(Template::Interpolated(fragments)),
    }
}

fn is_key_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dotted_and_bracketed_paths() {
        let path = ReferencePath::parse(" positions.items[2].symbol ").expect("path");
        assert_eq!(path.root(), "positions");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("items".into()),
                PathSegment::Index(2),
                PathSegment::Key("symbol".into())
            ]
        );
        assert_eq!(path.as_str(), "positions.items[2].symbol");

        let numeric = ReferencePath::parse("rows.0").expect("numeric key");
        assert_eq!(numeric.segments(), &[PathSegment::Key("0".into())]);
    }

    #[test]
    fn rejects_malformed_paths() {
        for raw in ["", ".field", "a..b", "a[", "a[x]", "a b", "a.b c"] {
            assert!(ReferencePath::parse(raw).is_err(), "expected '{raw}' to be rejected");
        }
    }

    #[test]
    fn whole_value_placeholder_is_a_reference() {
        let template = Template::parse(&json!("{{ data.total }}")).expect("template");
        assert!(matches!(template, Template::Reference(ref path) if path.root() == "data"));
    }

    #[test]
    fn embedded_placeholders_become_interpolation() {
        let template = Template::parse(&json!("Report for {{ client.name }} as of {{context.as_of}}")).expect("template");
        let Template::Interpolated(fragments) = &template else {
            panic!("expected interpolation, got {template:?}");
        };
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[0], Fragment::Text("Report for ".into()));
        let roots: Vec<_> = template.references().iter().map(|path| path.root().to_string()).collect();
        assert_eq!(roots, vec!["client", "context"]);
    }

    #[test]
    fn plain_values_stay_literal() {
        assert_eq!(Template::parse(&json!("plain")).expect("text"), Template::Literal(json!("plain")));
        assert_eq!(Template::parse(&json!(42)).expect("number"), Template::Literal(json!(42)));
        assert_eq!(
            Template::parse(&json!({"a": [1, "b"]})).expect("object"),
            Template::Literal(json!({"a": [1, "b"]}))
        );
        assert_eq!(Template::parse(&json!("a }} b")).expect("stray close"), Template::Literal(json!("a }} b")));
    }

    #[test]
    fn nested_containers_collect_references() {
        let template = Template::parse(&json!({
            "symbols": ["{{ first }}", "fixed", "{{ second.code }}"],
            "meta": {"owner": "{{ context.user }}"}
        }))
        .expect("template");
        let roots: Vec<_> = template.references().iter().map(|path| path.root().to_string()).collect();
        assert_eq!(roots, vec!["first", "second", "context"]);
    }

    #[test]
    fn escaped_braces_stay_literal() {
        assert_eq!(
            Template::parse(&json!("\\{{ not a ref }}")).expect("escaped"),
            Template::Literal(json!("{{ not a ref }}"))
        );

        let template = Template::parse(&json!("use \\{{ name }} for {{ kind }}")).expect("mixed");
        let Template::Interpolated(fragments) = &template else {
            panic!("expected interpolation: {template:?}");
        };
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Fragment::Text("use {{ name }} for ".into()));
        let roots: Vec<_> = template.references().iter().map(|path| path.root().to_string()).collect();
        assert_eq!(roots, vec!["kind"]);
    }

    #[test]
    fn malformed_placeholders_are_invalid() {
        for raw in ["{{ open", "{{   }}", "x {{ a..b }}"] {
            let error = Template::parse(&json!(raw)).expect_err(raw);
            assert!(matches!(error, TemplateError::Invalid { ref template, .. } if template == raw), "{raw}: {error:?}");
        }
    }
}
