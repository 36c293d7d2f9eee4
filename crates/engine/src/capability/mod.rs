//! Capability providers and the registry that dispatches to them.
//!
//! Modules:
//! - `registry`: name-keyed lookup with duplicate policy and contract checks
//!
//! A capability is any type implementing [`Capability`]. The engine never
//! inspects a provider's internals; it hands over the resolved argument map and
//! a [`CapabilityContext`], and receives a JSON result or a [`CapabilityError`].

mod registry;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;

use crate::error::CapabilityError;

pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder, DuplicatePolicy, RegisteredCapability};

/// Run-scoped information handed to a provider alongside its arguments.
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    /// Identifier of the run this dispatch belongs to.
    pub run_id: String,
    /// Identifier of the workflow being executed.
    pub workflow: String,
    /// Zero-based index of the dispatching step.
    pub step: usize,
    /// Read-only invocation context supplied by the caller.
    pub invocation: Arc<JsonMap<String, Value>>,
    /// Cancelled when the run is cancelled or times out. Providers performing
    /// long I/O should select on it.
    pub cancellation: CancellationToken,
}

/// A named unit of domain behavior.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Execute the capability with fully resolved arguments.
    async fn invoke(&self, arguments: JsonMap<String, Value>, context: &CapabilityContext) -> Result<Value, CapabilityError>;
}

/// Adapts an async closure into a [`Capability`].
///
/// ```rust
/// use patterns_engine::capability::FnCapability;
/// use serde_json::{Value, json};
///
/// let echo = FnCapability::new(|arguments, _context| async move { Ok(Value::Object(arguments)) });
/// # let _ = (echo, json!(null));
/// ```
pub struct FnCapability<F> {
    function: F,
}

impl<F, Fut> FnCapability<F>
where
    F: Fn(JsonMap<String, Value>, CapabilityContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send,
{
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(JsonMap<String, Value>, CapabilityContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CapabilityError>> + Send,
{
    async fn invoke(&self, arguments: JsonMap<String, Value>, context: &CapabilityContext) -> Result<Value, CapabilityError> {
        (self.function)(arguments, context.clone()).await
    }
}
