//! Error types for the Swarmline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every error maps onto
//! one of the five runtime error kinds via [`Error::kind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Swarmline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model output errors ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Inter-agent messaging errors ---
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    // --- Runaway loop guard ---
    #[error("Iteration ceiling reached after {iterations} iterations")]
    LoopLimit { iterations: u32 },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Operation cancelled")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// The runtime error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Unparseable or schema-violating model output.
    Protocol,
    /// Completion backend failure or timeout.
    Provider,
    /// A tool invocation failed.
    Tool,
    /// Delivery failure, timeout, cancelled wait or switch cycle.
    Mailbox,
    /// Iteration ceiling reached.
    LoopLimit,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Protocol => "PROTOCOL",
            Self::Provider => "PROVIDER",
            Self::Tool => "TOOL",
            Self::Mailbox => "MAILBOX",
            Self::LoopLimit => "LOOP_LIMIT",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Classify this error into the runtime taxonomy.
    ///
    /// Errors outside the taxonomy (configuration, cancellation, internal)
    /// return `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Protocol(_) | Error::Serialization(_) => Some(ErrorKind::Protocol),
            Error::Provider(_) => Some(ErrorKind::Provider),
            Error::Tool(_) => Some(ErrorKind::Tool),
            Error::Mailbox(_) | Error::UnknownAgent(_) => Some(ErrorKind::Mailbox),
            Error::LoopLimit { .. } => Some(ErrorKind::LoopLimit),
            Error::Cancelled | Error::Config { .. } | Error::Internal(_) => None,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Model returned empty output")]
    EmptyOutput,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::Network(_)
            | ProviderError::StreamInterrupted(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MailboxError {
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("No reply to {message_id} within {waited_ms}ms")]
    Timeout { message_id: String, waited_ms: u64 },

    #[error("Wait for reply to {message_id} was cancelled")]
    Cancelled { message_id: String },

    #[error("Blocking send would deadlock: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("Maximum switch depth {max_depth} exceeded")]
    SwitchDepthExceeded { max_depth: usize },

    #[error("Switch rejected: {0}")]
    SwitchRejected(String),

    #[error("Agent {0} cannot send a blocking message to itself")]
    SelfSend(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
