//! Workflow-specific runtime helpers.
//!
//! - `document`: parse YAML/JSON documents into definitions
//! - `source`: where documents come from (file system, memory)
//! - `state`: per-run binding state
//! - `condition`: step guard expressions

pub mod condition;
pub mod document;
pub mod source;
pub mod state;
