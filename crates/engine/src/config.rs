//! Orchestrator configuration and its on-disk location.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};

use crate::{capability::DuplicatePolicy, validator::ValidationConfig};

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "PATTERNS_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// What the registry does when a capability name is registered twice.
    pub duplicate_policy: DuplicatePolicy,
    /// Wall-clock budget for a single run. `None` disables the timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
    pub validation: ValidationConfig,
    /// Directory (or file) holding workflow documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflows_dir: Option<PathBuf>,
}

/// Returns the default path for the orchestrator configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patterns")
        .join("config.yaml")
}

/// Loads configuration from the default path.
pub fn load_config() -> Result<OrchestratorConfig> {
    load_config_from_path(&default_config_path())
}

/// Loads configuration from `path`, falling back to defaults when it does not exist.
///
/// The file may be YAML or JSON; JSON is a subset of the YAML the parser accepts.
pub fn load_config_from_path(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        return Ok(OrchestratorConfig::default());
    }

    let content = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(OrchestratorConfig::default());
    }
    let mut config: OrchestratorConfig =
        serde_yaml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    if let Some(directory) = &config.workflows_dir {
        config.workflows_dir = Some(expand_tilde(&directory.to_string_lossy()));
    }
    Ok(config)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
