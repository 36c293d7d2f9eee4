use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use once_cell::sync::Lazy;
use patterns_types::{CapabilityContract, ContractField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Capability;
use crate::error::RegistryError;

static CAPABILITY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("capability name pattern compiles"));

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("field name pattern compiles"));

/// What happens when a capability name is registered twice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// A second registration fails with `DuplicateCapability`.
    #[default]
    Reject,
    /// The last registration wins.
    Replace,
}

/// A provider bound to a capability name, with its optional contract.
#[derive(Clone)]
pub struct RegisteredCapability {
    pub provider: Arc<dyn Capability>,
    pub contract: Option<CapabilityContract>,
}

impl fmt::Debug for RegisteredCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCapability")
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

/// Collects provider bindings during startup.
///
/// The builder is the only place bindings change; [`CapabilityRegistryBuilder::build`]
/// freezes them into a read-only [`CapabilityRegistry`].
#[derive(Debug, Default)]
pub struct CapabilityRegistryBuilder {
    policy: DuplicatePolicy,
    entries: BTreeMap<String, RegisteredCapability>,
}

impl CapabilityRegistryBuilder {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
        }
    }

    /// Binds `name` to `provider`, applying the configured duplicate policy.
    ///
    /// # Errors
    /// - `InvalidCapabilityName` when `name` is not namespaced (`domain.action`)
    /// - `InvalidContract` when the contract has empty, malformed, or repeated field names
    /// - `DuplicateCapability` when `name` is bound and the policy is `Reject`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: impl Capability + 'static,
        contract: Option<CapabilityContract>,
    ) -> Result<&mut Self, RegistryError> {
        let replace = self.policy == DuplicatePolicy::Replace;
        self.insert(name.into(), Arc::new(provider), contract, replace)
    }

    /// Binds `name` to `provider`, replacing any existing binding regardless of policy.
    pub fn register_override(
        &mut self,
        name: impl Into<String>,
        provider: impl Capability + 'static,
        contract: Option<CapabilityContract>,
    ) -> Result<&mut Self, RegistryError> {
        self.insert(name.into(), Arc::new(provider), contract, true)
    }

    /// Binds an already shared provider.
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Capability>,
        contract: Option<CapabilityContract>,
    ) -> Result<&mut Self, RegistryError> {
        let replace = self.policy == DuplicatePolicy::Replace;
        self.insert(name.into(), provider, contract, replace)
    }

    fn insert(
        &mut self,
        name: String,
        provider: Arc<dyn Capability>,
        contract: Option<CapabilityContract>,
        replace: bool,
    ) -> Result<&mut Self, RegistryError> {
        if !CAPABILITY_NAME.is_match(&name) {
            return Err(RegistryError::InvalidCapabilityName { name });
        }
        if let Some(contract) = &contract {
            validate_contract(&name, contract)?;
        }
        if self.entries.contains_key(&name) {
            if !replace {
                return Err(RegistryError::DuplicateCapability { name });
            }
            warn!(capability = %name, "replacing existing capability registration");
        }
        debug!(capability = %name, has_contract = contract.is_some(), "capability registered");
        self.entries.insert(name, RegisteredCapability { provider, contract });
        Ok(self)
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry { entries: self.entries }
    }
}

/// Read-only lookup from capability name to provider.
///
/// Constructed once through [`CapabilityRegistryBuilder`] and shared behind an
/// `Arc`; lookups take no locks.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, RegisteredCapability>,
}

impl CapabilityRegistry {
    pub fn builder(policy: DuplicatePolicy) -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::new(policy)
    }

    /// Looks up the provider bound to `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| RegistryError::UnknownCapability { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in lexical order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns the contract registered for `name`, `Ok(None)` when the capability has none.
    pub fn describe(&self, name: &str) -> Result<Option<&CapabilityContract>, RegistryError> {
        self.entries
            .get(name)
            .map(|entry| entry.contract.as_ref())
            .ok_or_else(|| RegistryError::UnknownCapability { name: name.to_string() })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_contract(name: &str, contract: &CapabilityContract) -> Result<(), RegistryError> {
    validate_fields(name, "input", &contract.inputs)?;
    validate_fields(name, "output", &contract.outputs)
}

fn validate_fields(name: &str, direction: &str, fields: &[ContractField]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !FIELD_NAME.is_match(&field.name) {
            return Err(RegistryError::InvalidContract {
                name: name.to_string(),
                reason: format!("{direction} field name '{}' is not a valid identifier", field.name),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(RegistryError::InvalidContract {
                name: name.to_string(),
                reason: format!("{direction} field '{}' is declared more than once", field.name),
            });
        }
    }
    Ok(())
}
