//! Step guard expressions.
//!
//! Guards are parsed once at load time into a [`Condition`] tree and evaluated
//! against the run state just before a step would dispatch. Supported syntax:
//! `path`, `!expr`, `a == b`, `a != b`, `a && b`, `a || b`, and parentheses.
//! Operands are reference paths or JSON literals (`"text"`, `'text'`, `42`,
//! `true`, `null`, `[..]`, `{..}`). An outer `{{ ... }}` wrapper is accepted.

use serde_json::Value;

use crate::{
    error::TemplateError,
    template::{ReferencePath, resolve_reference},
    workflow::state::RunState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Reference(ReferencePath),
}

/// Parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Not(Box<Condition>),
    Compare { left: Operand, op: CompareOp, right: Operand },
    Truthy(Operand),
}

impl Condition {
    /// Parses a guard expression.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let normalized = normalize_condition_expression(raw);
        if normalized.is_empty() {
            return Err(TemplateError::invalid(raw, "expression cannot be empty"));
        }
        parse_node(&normalized).map_err(|reason| TemplateError::invalid(raw, reason))
    }

    /// Evaluates against the current bindings.
    ///
    /// References that cannot be resolved are an error, not `false`: a guard
    /// that reads a binding never produced is a wiring mistake.
    pub fn evaluate(&self, state: &RunState) -> Result<bool, TemplateError> {
        match self {
            Condition::Or(parts) => {
                for part in parts {
                    if part.evaluate(state)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::And(parts) => {
                for part in parts {
                    if !part.evaluate(state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(state)?),
            Condition::Compare { left, op, right } => {
                let equal = values_equal(&left.value(state)?, &right.value(state)?);
                Ok(match op {
                    CompareOp::Equal => equal,
                    CompareOp::NotEqual => !equal,
                })
            }
            Condition::Truthy(operand) => Ok(is_truthy(&operand.value(state)?)),
        }
    }

    /// Every reference in the expression, left to right.
    pub fn references(&self) -> Vec<&ReferencePath> {
        let mut references = Vec::new();
        self.collect_references(&mut references);
        references
    }

    fn collect_references<'a>(&'a self, references: &mut Vec<&'a ReferencePath>) {
        match self {
            Condition::Or(parts) | Condition::And(parts) => parts.iter().for_each(|part| part.collect_references(references)),
            Condition::Not(inner) => inner.collect_references(references),
            Condition::Compare { left, right, .. } => {
                left.collect_reference(references);
                right.collect_reference(references);
            }
            Condition::Truthy(operand) => operand.collect_reference(references),
        }
    }
}

impl Operand {
    fn value(&self, state: &RunState) -> Result<Value, TemplateError> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Reference(path) => resolve_reference(path, state),
        }
    }

    fn collect_reference<'a>(&'a self, references: &mut Vec<&'a ReferencePath>) {
        if let Operand::Reference(path) = self {
            references.push(path);
        }
    }
}

/// JavaScript-like truthiness: `null`, `false`, `0`, `""`, `[]`, and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

/// Trims whitespace and strips an outer `{{ ... }}` wrapper.
fn normalize_condition_expression(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix("{{").and_then(|rest| rest.strip_suffix("}}")) {
        inner.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_node(expression: &str) -> Result<Condition, String> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err("operand cannot be empty".to_string());
    }

    if let Some(parts) = split_expression(expression, "||")? {
        return parts.into_iter().map(parse_node).collect::<Result<_, _>>().map(Condition::Or);
    }
    if let Some(parts) = split_expression(expression, "&&")? {
        return parts.into_iter().map(parse_node).collect::<Result<_, _>>().map(Condition::And);
    }
    if let Some(inner) = strip_enclosing_parentheses(expression) {
        return parse_node(inner);
    }

    let not_equal = find_top_level_operator(expression, "!=");
    let equal = find_top_level_operator(expression, "==");
    let comparison = match (not_equal, equal) {
        (Some(left), Some(right)) => Some(if left < right { (left, CompareOp::NotEqual) } else { (right, CompareOp::Equal) }),
        (Some(position), None) => Some((position, CompareOp::NotEqual)),
        (None, Some(position)) => Some((position, CompareOp::Equal)),
        (None, None) => None,
    };
    if let Some((position, op)) = comparison {
        let left = expression[..position].trim();
        let right = expression[position + 2..].trim();
        if left.is_empty() || right.is_empty() {
            return Err("comparison expression must include both left and right operands".to_string());
        }
        if find_top_level_operator(right, "==").is_some() || find_top_level_operator(right, "!=").is_some() {
            return Err("chained comparisons are unsupported; combine them with '&&' or '||'".to_string());
        }
        return Ok(Condition::Compare {
            left: parse_operand(left)?,
            op,
            right: parse_operand(right)?,
        });
    }

    if let Some(rest) = expression.strip_prefix('!') {
        if rest.trim().is_empty() {
            return Err("expression cannot end with negation operator".to_string());
        }
        return Ok(Condition::Not(Box::new(parse_node(rest)?)));
    }

    Ok(Condition::Truthy(parse_operand(expression)?))
}

fn parse_operand(expression: &str) -> Result<Operand, String> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err("operand cannot be empty".to_string());
    }
    if let Some(text) = trimmed.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) {
        return Ok(Operand::Literal(Value::String(text.to_string())));
    }
    if looks_like_json_literal(trimmed) {
        return serde_json::from_str::<Value>(trimmed)
            .map(Operand::Literal)
            .map_err(|error| format!("invalid literal '{trimmed}': {error}"));
    }
    ReferencePath::parse(trimmed)
        .map(Operand::Reference)
        .map_err(|error| match error {
            TemplateError::Invalid { reason, .. } => format!("invalid operand '{trimmed}': {reason}"),
            other => other.to_string(),
        })
}

fn looks_like_json_literal(expression: &str) -> bool {
    let starts_like_number = expression
        .chars()
        .next()
        .map(|character| character == '-' || character.is_ascii_digit())
        .unwrap_or(false);
    expression.starts_with('[')
        || expression.starts_with('{')
        || expression.starts_with('"')
        || expression == "null"
        || expression == "true"
        || expression == "false"
        || (starts_like_number && expression.parse::<f64>().is_ok())
}

fn strip_enclosing_parentheses(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('(')?.strip_suffix(')')?;
    // `(a) || (b)` starts and ends with parentheses without being enclosed by one pair.
    let mut depth = 0i32;
    let mut scanner = QuoteScanner::default();
    for character in inner.chars() {
        if scanner.consume(character) {
            continue;
        }
        match character {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

fn split_expression<'a>(expression: &'a str, operator: &str) -> Result<Option<Vec<&'a str>>, String> {
    let mut parts = Vec::new();
    let mut start = 0usize;

    while let Some(relative_index) = find_top_level_operator(&expression[start..], operator) {
        let absolute_index = start + relative_index;
        parts.push(expression[start..absolute_index].trim());
        start = absolute_index + operator.len();
    }
    if parts.is_empty() {
        return Ok(None);
    }
    parts.push(expression[start..].trim());
    if parts.iter().any(|part| part.is_empty()) {
        return Err(format!("'{operator}' must have an operand on each side"));
    }
    Ok(Some(parts))
}

fn find_top_level_operator(expression: &str, operator: &str) -> Option<usize> {
    let mut scanner = QuoteScanner::default();
    let mut depth = 0i32;

    for (index, character) in expression.char_indices() {
        if scanner.consume(character) {
            continue;
        }
        match character {
            '(' | '[' | '{' => {
                depth += 1;
                continue;
            }
            ')' | ']' | '}' => {
                depth = (depth - 1).max(0);
                continue;
            }
            _ => {}
        }
        if depth == 0 && expression[index..].starts_with(operator) {
            return Some(index);
        }
    }

    None
}

/// Tracks whether the scan position is inside a quoted literal.
#[derive(Default)]
struct QuoteScanner {
    in_single_quote: bool,
    in_double_quote: bool,
    escaped: bool,
}

impl QuoteScanner {
    /// Returns true when `character` belongs to (or delimits) a quoted literal.
    fn consume(&mut self, character: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return true;
        }
        match character {
            '\\' if self.in_double_quote => {
                self.escaped = true;
                true
            }
            '"' if !self.in_single_quote => {
                self.in_double_quote = !self.in_double_quote;
                true
            }
            '\'' if !self.in_double_quote => {
                self.in_single_quote = !self.in_single_quote;
                true
            }
            _ => self.in_single_quote || self.in_double_quote,
        }
    }
}
