//! Dependency validation.
//!
//! - `load`: per-definition checks when a catalog is loaded; failing
//!   definitions are excluded from the runnable set
//! - `run`: per-invocation checks immediately before the first dispatch

mod load;
mod run;

use patterns_types::Severity;
use serde::{Deserialize, Serialize};

pub use load::{DefinitionOutcome, UNNAMED_WORKFLOW, validate_definition};
pub use run::{check_references, lint_references, validate_invocation};

/// Severity assigned to contract findings, which are advisory by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Severity for arguments or downstream references that disagree with a contract.
    pub contract_mismatch: Severity,
    /// Severity for steps bound to placeholder capabilities.
    pub placeholder_capability: Severity,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            contract_mismatch: Severity::Warning,
            placeholder_capability: Severity::Warning,
        }
    }
}
