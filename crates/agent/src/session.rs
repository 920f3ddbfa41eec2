//! Agent sessions — one agent's conversational state.
//!
//! A session is mutated only by the controller driving it; the runtime keeps
//! each one behind its own async mutex so turns stay strictly sequential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarmline_codec::ChannelCodec;
use swarmline_core::{AgentProfile, ChannelResponse, ContinuationDecision, Message, ToolCall, ToolResult};
use crate::continuation::EngineState;

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    User {
        content: String,
        at: DateTime<Utc>,
    },
    Assistant {
        response: ChannelResponse,
        at: DateTime<Utc>,
    },
    ToolResult {
        call: ToolCall,
        result: ToolResult,
        at: DateTime<Utc>,
    },
    /// Notes injected by the runtime (switch summaries, mail notices)
    System {
        content: String,
        at: DateTime<Utc>,
    },
}

/// Conversational state of one agent.
#[derive(Debug, Clone)]
pub struct AgentSession {
    profile: AgentProfile,
    history: Vec<HistoryEntry>,
    state: EngineState,
    last_decision: Option<ContinuationDecision>,
    deferred: Vec<ToolCall>,
    created_at: DateTime<Utc>,
}

impl AgentSession {
    pub fn new(profile: AgentProfile) -> Self {
        Self {
            profile,
            history: Vec::new(),
            state: EngineState::Evaluating,
            last_decision: None,
            deferred: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_decision(&self) -> Option<&ContinuationDecision> {
        self.last_decision.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: EngineState) {
        self.state = state;
    }

    pub(crate) fn set_last_decision(&mut self, decision: ContinuationDecision) {
        self.last_decision = Some(decision);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(HistoryEntry::User {
            content: content.into(),
            at: Utc::now(),
        });
    }

    pub fn push_assistant(&mut self, response: ChannelResponse) {
        self.history.push(HistoryEntry::Assistant {
            response,
            at: Utc::now(),
        });
    }

    pub fn push_tool_result(&mut self, call: ToolCall, result: ToolResult) {
        self.history.push(HistoryEntry::ToolResult {
            call,
            result,
            at: Utc::now(),
        });
    }

    pub fn inject_system(&mut self, content: impl Into<String>) {
        self.history.push(HistoryEntry::System {
            content: content.into(),
            at: Utc::now(),
        });
    }

    /// Calls postponed by single-call discipline.
    pub fn deferred(&self) -> &[ToolCall] {
        &self.deferred
    }

    pub(crate) fn defer(&mut self, calls: Vec<ToolCall>) {
        self.deferred = calls;
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.deferred)
    }

    /// Whether this agent may invoke `tool`. An empty allow-list permits all.
    pub fn permits(&self, tool: &str) -> bool {
        self.profile.tools.is_empty() || self.profile.tools.iter().any(|t| t == tool)
    }

    pub fn assistant_turns(&self) -> usize {
        self.history
            .iter()
            .filter(|e| matches!(e, HistoryEntry::Assistant { .. }))
            .count()
    }

    pub fn last_response(&self) -> Option<&ChannelResponse> {
        self.history.iter().rev().find_map(|e| match e {
            HistoryEntry::Assistant { response, .. } => Some(response),
            _ => None,
        })
    }

    /// Flatten the history into provider messages behind `system_prompt`.
    ///
    /// Assistant turns are replayed in the structured encoding so the model
    /// keeps seeing the protocol it is asked to speak.
    pub fn to_messages(&self, system_prompt: &str, codec: &ChannelCodec) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(system_prompt));
        for entry in &self.history {
            let message = match entry {
                HistoryEntry::User { content, .. } => Message::user(content.as_str()),
                HistoryEntry::Assistant { response, .. } => {
                    Message::assistant(codec.serialize(response))
                }
                HistoryEntry::ToolResult { call, result, .. } => {
                    Message::tool_result(call.id.as_str(), result.render())
                }
                HistoryEntry::System { content, .. } => Message::system(content.as_str()),
            };
            messages.push(message);
        }
        messages
    }

    /// Short recap of the latest exchanges, used as a switch summary.
    pub fn summary(&self, max_entries: usize) -> String {
        let lines: Vec<String> = self
            .history
            .iter()
            .filter_map(|e| match e {
                HistoryEntry::User { content, .. } => Some(format!("user: {content}")),
                HistoryEntry::Assistant { response, .. } if !response.final_text.is_empty() => {
                    Some(format!("{}: {}", self.name(), response.final_text))
                }
                _ => None,
            })
            .collect();
        let skip = lines.len().saturating_sub(max_entries);
        lines[skip..].join("\n")
    }
}
