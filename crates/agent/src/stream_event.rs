//! Runtime streaming events.
//!
//! `RuntimeEvent` is what the session loop reports while it works. The
//! gateway forwards these over WebSocket; the CLI prints them.

use serde::{Deserialize, Serialize};
use swarmline_core::{ContinuationDecision, ErrorKind};
use tokio::sync::mpsc;
use crate::controller::DriveStatus;

/// Where a drive sends its events.
pub type EventSink = mpsc::UnboundedSender<RuntimeEvent>;

/// Events emitted by the runtime during a drive.
///
/// Frame types on the wire:
/// - `commentary`   — tool/technical trace (verbose clients only)
/// - `final`        — user-facing answer of one iteration
/// - `tool_call`    — an agent is invoking a capability
/// - `tool_result`  — the capability finished
/// - `continuation` — the engine's decision after an iteration
/// - `warning`      — non-fatal protocol deviation
/// - `switched`     — the active agent changed
/// - `done`         — the drive finished
/// - `error`        — the drive ended in error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Commentary {
        agent: String,
        content: String,
    },

    Final {
        agent: String,
        content: String,
    },

    ToolCall {
        agent: String,
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        agent: String,
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    Continuation {
        agent: String,
        iteration: u32,
        decision: ContinuationDecision,
    },

    Warning {
        agent: String,
        message: String,
    },

    Switched {
        from: String,
        to: String,
        reason: String,
    },

    Done {
        agent: String,
        status: DriveStatus,
        iterations: u32,
    },

    Error {
        agent: String,
        kind: Option<ErrorKind>,
        message: String,
    },
}

impl RuntimeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Commentary { .. } => "commentary",
            Self::Final { .. } => "final",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Continuation { .. } => "continuation",
            Self::Warning { .. } => "warning",
            Self::Switched { .. } => "switched",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Trace frames that non-verbose clients do not receive.
    pub fn is_verbose_only(&self) -> bool {
        matches!(
            self,
            Self::Commentary { .. }
                | Self::ToolCall { .. }
                | Self::ToolResult { .. }
                | Self::Warning { .. }
        )
    }
}
