//! Template mini-language for step arguments.
//!
//! - `parser`: compiles argument values into a [`Template`] expression tree
//! - `resolve`: evaluates a compiled tree against a run's bindings
//!
//! Placeholders use the `{{ path }}` syntax, where `path` starts with a binding
//! name (a step's `as`, an input, or the `inputs`/`context` roots) followed by
//! `.key`, `.0`, or `[0]` segments. A backslash before `{{` keeps the braces as
//! literal text.

mod parser;
mod resolve;

pub use parser::{Fragment, PathSegment, ReferencePath, Template};
pub use resolve::{resolve, resolve_arguments, resolve_reference};
