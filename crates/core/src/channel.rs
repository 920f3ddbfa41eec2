//! Channel response types — the decoded shape of one model turn.
//!
//! Every model output is split into three channels:
//! - `analysis`: private reasoning, never shown to the user
//! - `commentary`: tool requests and progress notes, shown only in verbose mode
//! - `final`: the user-facing answer
//!
//! plus a [`ContinuationDecision`] saying whether the agent wants
//! another autonomous iteration.

use serde::{Deserialize, Serialize};
use crate::tool::ToolCall;

/// Whether the agent wants to keep working autonomously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Continuation {
    Continue,
    Terminate,
}

impl Continuation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Terminate => "TERMINATE",
        }
    }

    /// Parse a status word case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONTINUE" => Some(Self::Continue),
            "TERMINATE" | "STOP" | "DONE" => Some(Self::Terminate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported progress through a multi-step task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current_step: u32,

    #[serde(default)]
    pub total_steps: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remaining_steps: Vec<String>,
}

/// Reason recorded when model output carries no usable continuation signal.
pub const NO_CONTINUATION_SIGNAL: &str = "no continuation signal present";

/// The agent's request to continue or stop after the current turn.
///
/// Defaults to TERMINATE with [`NO_CONTINUATION_SIGNAL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationDecision {
    pub kind: Continuation,

    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl ContinuationDecision {
    pub fn continue_with(reason: impl Into<String>) -> Self {
        Self {
            kind: Continuation::Continue,
            reason: reason.into(),
            progress: None,
        }
    }

    pub fn terminate(reason: impl Into<String>) -> Self {
        Self {
            kind: Continuation::Terminate,
            reason: reason.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn wants_continue(&self) -> bool {
        self.kind == Continuation::Continue
    }
}

impl Default for ContinuationDecision {
    fn default() -> Self {
        Self::terminate(NO_CONTINUATION_SIGNAL)
    }
}

/// One model turn, decoded into channels, with its continuation decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelResponse {
    #[serde(default)]
    pub analysis: String,

    #[serde(default)]
    pub commentary: String,

    #[serde(rename = "final", default)]
    pub final_text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub decision: ContinuationDecision,
}

impl ChannelResponse {
    /// A response carrying only a final answer.
    pub fn final_only(text: impl Into<String>) -> Self {
        Self {
            final_text: text.into(),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn with_decision(mut self, decision: ContinuationDecision) -> Self {
        self.decision = decision;
        self
    }

    pub fn continuation(&self) -> Continuation {
        self.decision.kind
    }
}
