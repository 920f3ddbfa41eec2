//! Built-in tool implementations for Swarmline.
//!
//! Filesystem tools are confined to a single workspace root. The runtime
//! adds its own mailbox and switch capabilities on top of this registry.

pub mod list_directory;
pub mod read_file;
pub mod sandbox;

use std::path::PathBuf;
use std::time::Duration;
use swarmline_core::tool::ToolRegistry;

pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use sandbox::Workspace;

/// Create a registry with all built-in tools rooted at `root`.
pub fn default_registry(root: impl Into<PathBuf>, timeout: Duration) -> ToolRegistry {
    let workspace = Workspace::new(root);
    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Box::new(ListDirectoryTool::new(workspace.clone())));
    registry.register(Box::new(ReadFileTool::new(workspace)));
    registry
}

/// Build the registry described by the `[tools]` config section.
pub fn registry_from_config(config: &swarmline_config::AppConfig) -> ToolRegistry {
    default_registry(
        config.tool_root(),
        Duration::from_secs(config.tools.timeout_secs),
    )
}
