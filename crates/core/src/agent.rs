//! Agent profile and runtime-behaviour types.

use serde::{Deserialize, Serialize};

/// Static description of one agent in the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name; also the agent's mailbox key
    pub name: String,

    /// Short role label (e.g., "architect", "reviewer")
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub description: String,

    /// Extra system instructions prepended to the channel protocol prompt
    #[serde(default)]
    pub system_prompt: String,

    /// Capabilities this agent may invoke. Empty means every registered tool.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Per-task iteration bound. `None` leaves only the global ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: String::new(),
            description: String::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
            max_iterations: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }
}

/// How many requested tool calls run per iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDiscipline {
    /// Execute only the first requested call; defer the rest
    #[default]
    Single,
    /// Execute every requested call in order
    Batch,
}
