//! Generic capabilities shipped with the CLI so workflows can be exercised
//! without domain providers.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use patterns_engine::{Capability, CapabilityContext, CapabilityError, CapabilityRegistry, CapabilityRegistryBuilder, DuplicatePolicy};
use patterns_types::{CapabilityContract, ValueType};
use serde_json::{Map as JsonMap, Value};

/// Returns its arguments unchanged.
pub struct Echo;

#[async_trait]
impl Capability for Echo {
    async fn invoke(&self, arguments: JsonMap<String, Value>, _context: &CapabilityContext) -> Result<Value, CapabilityError> {
        Ok(Value::Object(arguments))
    }
}

/// Shallow-merges object arguments in argument order; later keys win.
/// Non-object arguments are inserted under their own name.
pub struct Merge;

#[async_trait]
impl Capability for Merge {
    async fn invoke(&self, arguments: JsonMap<String, Value>, _context: &CapabilityContext) -> Result<Value, CapabilityError> {
        let mut merged = JsonMap::new();
        for (name, value) in arguments {
            match value {
                Value::Object(fields) => merged.extend(fields),
                other => {
                    merged.insert(name, other);
                }
            }
        }
        Ok(Value::Object(merged))
    }
}

/// Waits `ms` milliseconds, then returns `value` (or null).
pub struct Sleep;

#[async_trait]
impl Capability for Sleep {
    async fn invoke(&self, mut arguments: JsonMap<String, Value>, context: &CapabilityContext) -> Result<Value, CapabilityError> {
        let millis = arguments
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| CapabilityError::invalid_arguments("'ms' must be a non-negative integer"))?;
        let value = arguments.remove("value").unwrap_or(Value::Null);

        tokio::select! {
            _ = context.cancellation.cancelled() => Err(CapabilityError::failed("sleep interrupted")),
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(value),
        }
    }
}

/// Registers the built-in capability set on `builder`.
pub fn register_builtins(builder: &mut CapabilityRegistryBuilder) -> Result<()> {
    builder.register("core.echo", Echo, Some(CapabilityContract::new("Return the resolved arguments as an object")))?;
    builder.register(
        "core.merge",
        Merge,
        Some(CapabilityContract::new("Shallow-merge object arguments; later keys win")),
    )?;
    builder.register(
        "core.sleep",
        Sleep,
        Some(
            CapabilityContract::new("Wait for a number of milliseconds, then return 'value'")
                .with_input("ms", ValueType::Integer)
                .with_optional_input("value", ValueType::Any),
        ),
    )?;
    Ok(())
}

/// Builds a registry holding only the built-in capabilities.
pub fn builtin_registry(policy: DuplicatePolicy) -> Result<CapabilityRegistry> {
    let mut builder = CapabilityRegistry::builder(policy);
    register_builtins(&mut builder)?;
    Ok(builder.build())
}
