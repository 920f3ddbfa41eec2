//! Workspace sandbox — confines filesystem tools to one root directory.
//!
//! Paths from the model are resolved relative to the root. Traversal
//! components and absolute paths outside the root are rejected, and existing
//! paths are canonicalized so symlinks cannot escape.

use std::path::{Component, Path, PathBuf};
use swarmline_core::error::ToolError;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path to a location inside the workspace.
    pub fn resolve(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        let denied = |reason: String| ToolError::PermissionDenied {
            tool_name: tool_name.into(),
            reason,
        };

        let input = Path::new(path);
        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(denied(format!("path traversal detected in '{path}'")));
        }

        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.root.join(input)
        };

        let resolved = if joined.exists() {
            joined.canonicalize().map_err(|e| ToolError::ExecutionFailed {
                tool_name: tool_name.into(),
                reason: format!("failed to resolve '{path}': {e}"),
            })?
        } else {
            joined
        };

        if !resolved.starts_with(&self.root) {
            return Err(denied(format!("'{path}' is outside the workspace")));
        }

        Ok(resolved)
    }
}
