//! File read tool — read file contents inside the workspace.

use async_trait::async_trait;
use swarmline_core::error::ToolError;
use swarmline_core::tool::{Tool, ToolOutput};
use crate::sandbox::Workspace;

const DEFAULT_MAX_BYTES: usize = 64 * 1024;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Truncate the content after this many bytes (default 65536)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let max_bytes = arguments["max_bytes"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let resolved = self.workspace.resolve(self.name(), path)?;

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("Failed to read file '{path}': {e}"),
            })?;

        let total = bytes.len();
        let truncated = total > max_bytes;
        let mut content = String::from_utf8_lossy(&bytes[..total.min(max_bytes)]).into_owned();
        if truncated {
            content.push_str(&format!("\n... [truncated, {total} bytes total]"));
        }

        Ok(ToolOutput {
            output: content,
            data: Some(serde_json::json!({
                "path": path,
                "bytes": total,
                "truncated": truncated,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_in(dir: &tempfile::TempDir) -> ReadFileTool {
        ReadFileTool::new(Workspace::new(dir.path()))
    }

    #[test]
    fn tool_definition() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(&dir);
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let out = tool_in(&dir)
            .execute(serde_json::json!({"path": "test.txt"}))
            .await
            .unwrap();
        assert_eq!(out.output, "Hello, world!\n");
        assert_eq!(out.data.unwrap()["truncated"], false);
    }

    #[tokio::test]
    async fn large_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(100)).unwrap();

        let out = tool_in(&dir)
            .execute(serde_json::json!({"path": "big.txt", "max_bytes": 10}))
            .await
            .unwrap();
        assert!(out.output.starts_with("xxxxxxxxxx\n"));
        assert!(out.output.contains("100 bytes total"));
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_in(&dir)
            .execute(serde_json::json!({"path": "missing.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(&dir).execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(&dir)
            .execute(serde_json::json!({"path": "../../../etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
