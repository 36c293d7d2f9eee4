//! Workflow definition sources.
//!
//! The orchestrator is agnostic to storage: anything that can produce a list
//! of [`SourceDocument`]s implements [`WorkflowSource`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::debug;

use super::document::SourceDocument;

/// Produces raw workflow documents.
pub trait WorkflowSource: Send + Sync {
    /// Short description used in logs.
    fn describe(&self) -> String;

    /// Reads every document. An error here means the source itself is
    /// unreachable; malformed documents are reported later, per document.
    fn documents(&self) -> Result<Vec<SourceDocument>>;
}

/// Reads `.yaml`, `.yml`, and `.json` files from a file or a directory tree.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorkflowSource for FileSystemSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn documents(&self) -> Result<Vec<SourceDocument>> {
        let mut paths = Vec::new();
        if self.root.is_file() {
            paths.push(self.root.clone());
        } else {
            collect_workflow_files(&self.root, &mut paths)?;
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let content = fs::read_to_string(&path).with_context(|| format!("failed to read workflow file {}", path.display()))?;
                debug!(path = %path.display(), bytes = content.len(), "workflow document read");
                Ok(SourceDocument::new(path.display().to_string(), content))
            })
            .collect()
    }
}

fn collect_workflow_files(directory: &Path, paths: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(directory).with_context(|| format!("failed to read workflow directory {}", directory.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", directory.display()))?
            .path();
        if path.is_dir() {
            collect_workflow_files(&path, paths)?;
        } else if is_workflow_file(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

fn is_workflow_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|extension| extension.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

/// In-memory documents, for tests and for callers that fetch definitions themselves.
#[derive(Debug, Clone, Default)]
pub struct InlineSource {
    documents: Vec<SourceDocument>,
}

impl InlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, origin: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.push(SourceDocument::new(origin, content));
        self
    }
}

impl WorkflowSource for InlineSource {
    fn describe(&self) -> String {
        format!("inline ({} documents)", self.documents.len())
    }

    fn documents(&self) -> Result<Vec<SourceDocument>> {
        Ok(self.documents.clone())
    }
}
