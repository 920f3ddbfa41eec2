//! Directory listing tool.

use async_trait::async_trait;
use swarmline_core::error::ToolError;
use swarmline_core::tool::{Tool, ToolOutput};
use crate::sandbox::Workspace;

pub struct ListDirectoryTool {
    workspace: Workspace,
}

impl ListDirectoryTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory in the workspace. Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace (default \".\")"
                },
                "include_hidden": {
                    "type": "boolean",
                    "description": "Include entries starting with '.'"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let include_hidden = arguments["include_hidden"].as_bool().unwrap_or(false);
        let dir = self.workspace.resolve(self.name(), path)?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "list_directory".into(),
            reason,
        };

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| failed(format!("cannot list '{path}': {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| failed(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !include_hidden && name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        let output = if entries.is_empty() {
            "(empty directory)".to_string()
        } else {
            entries.join("\n")
        };

        Ok(ToolOutput {
            output,
            data: Some(serde_json::json!({
                "path": path,
                "count": entries.len(),
                "entries": entries,
            })),
        })
    }
}
