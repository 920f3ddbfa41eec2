//! Tool invocation gateway — the abstraction over agent capabilities.
//!
//! Tools form a closed registry resolved by name at invocation time. Every
//! [`ToolCall`] yields exactly one [`ToolResult`]: either a success payload
//! or a typed failure. Gateways never return `Err`; failures are values the
//! model can react to on its next iteration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,

    /// Name of the capability to execute
    pub name: String,

    /// Parameters as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// What a tool produces when it runs to completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Human/model readable output
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: None,
        }
    }
}

/// Typed failure kinds reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolFailureKind {
    NotFound,
    PermissionDenied,
    InvalidParameters,
    ExecutionError,
    Timeout,
}

impl From<&ToolError> for ToolFailureKind {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => Self::NotFound,
            ToolError::PermissionDenied { .. } => Self::PermissionDenied,
            ToolError::InvalidArguments(_) => Self::InvalidParameters,
            ToolError::ExecutionFailed { .. } => Self::ExecutionError,
            ToolError::Timeout { .. } => Self::Timeout,
        }
    }
}

/// Success payload or typed failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(ToolOutput),
    Failure {
        kind: ToolFailureKind,
        message: String,
    },
}

/// The result of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The capability that ran
    pub tool: String,

    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: ToolOutput) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            outcome: ToolOutcome::Success(output),
        }
    }

    pub fn failure(call: &ToolCall, kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn from_error(call: &ToolCall, err: &ToolError) -> Self {
        Self::failure(call, ToolFailureKind::from(err), err.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Text folded back into the conversation for the model to read.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(out) => out.output.clone(),
            ToolOutcome::Failure { kind, message } => {
                let kind = serde_json::to_value(kind)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                format!("Error [{kind}]: {message}")
            }
        }
    }
}

/// The core Tool trait.
///
/// Each capability implements this trait and is registered in the
/// [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_directory").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The consumed gateway interface: `invoke(tool_name, parameters) -> ToolResult`.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Definitions of every capability behind this gateway.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether a capability with this name exists.
    fn contains(&self, name: &str) -> bool;

    /// Invoke a capability. Never fails; failures are carried in the result.
    async fn invoke(&self, call: &ToolCall) -> ToolResult;
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Execute a tool call, propagating failures as `ToolError`.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        validate_arguments(&tool.parameters_schema(), &call.arguments)?;

        match tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone())).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolGateway for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
        match self.execute(call).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => ToolResult::from_error(call, &e),
        }
    }
}

/// Check arguments against the `required` list and primitive `type`s of a schema.
fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    let empty = serde_json::Map::new();
    let args = match arguments {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => &empty,
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object of parameters, got {other}"
            )));
        }
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required parameter '{key}'"
                )));
            }
        }
    }

    if let Some(props) = schema["properties"].as_object() {
        for (key, value) in args {
            let Some(expected) = props.get(key).and_then(|p| p["type"].as_str()) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::InvalidArguments(format!(
                    "parameter '{key}' must be of type {expected}"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolOutput, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolOutput::text(text))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Never finishes in time" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolOutput::default())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.contains("echo"));
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn invoke_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let call = ToolCall::new("echo", serde_json::json!({"text": "hello world"}));
        let result = registry.invoke(&call).await;
        assert!(result.is_success());
        assert_eq!(result.call_id, call.id);
        assert_eq!(result.render(), "hello world");
    }

    #[tokio::test]
    async fn invoke_missing_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("nonexistent", serde_json::json!({}));
        let result = registry.invoke(&call).await;
        assert!(matches!(
            result.outcome,
            ToolOutcome::Failure { kind: ToolFailureKind::NotFound, .. }
        ));
        assert!(result.render().starts_with("Error [NOT_FOUND]"));
    }

    #[tokio::test]
    async fn invoke_missing_parameter_is_invalid() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let call = ToolCall::new("echo", serde_json::json!({}));
        let result = registry.invoke(&call).await;
        assert!(matches!(
            result.outcome,
            ToolOutcome::Failure { kind: ToolFailureKind::InvalidParameters, .. }
        ));
    }

    #[tokio::test]
    async fn invoke_wrong_type_is_invalid() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let call = ToolCall::new("echo", serde_json::json!({"text": 42}));
        let result = registry.invoke(&call).await;
        assert!(matches!(
            result.outcome,
            ToolOutcome::Failure { kind: ToolFailureKind::InvalidParameters, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_times_out() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_secs(5));
        registry.register(Box::new(SlowTool));
        let call = ToolCall::new("slow", serde_json::json!({}));
        let result = registry.invoke(&call).await;
        assert!(matches!(
            result.outcome,
            ToolOutcome::Failure { kind: ToolFailureKind::Timeout, .. }
        ));
    }

    #[test]
    fn tool_result_serializes_with_status_tag() {
        let call = ToolCall::new("echo", serde_json::json!({"text": "x"}));
        let result = ToolResult::failure(&call, ToolFailureKind::ExecutionError, "boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["outcome"]["kind"], "EXECUTION_ERROR");
    }
}
