//! Shared test helpers: scripted providers and canned channel replies.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use swarmline_core::error::ProviderError;
use swarmline_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

enum Script {
    Queue(VecDeque<String>),
    Repeat(String),
    Fail(ProviderError),
}

/// A provider that plays back scripted raw outputs in order.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    script: Mutex<Script>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Queue(responses.into_iter().map(Into::into).collect()))
    }

    /// Return the same output forever.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::with_script(Script::Repeat(response.into()))
    }

    /// Fail every call with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }

    fn next(&self) -> Result<String, ProviderError> {
        match &mut *self.script.lock() {
            Script::Queue(queue) => Ok(queue
                .pop_front()
                .unwrap_or_else(|| panic!("ScriptedProvider: no more responses"))),
            Script::Repeat(text) => Ok(text.clone()),
            Script::Fail(error) => Err(error.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ProviderResponse {
            content: self.next()?,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

/// Routes each request to the script of the agent named in its system prompt.
pub struct AgentScripts {
    agents: HashMap<String, ScriptedProvider>,
}

impl AgentScripts {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn agent(mut self, name: &str, provider: ScriptedProvider) -> Self {
        self.agents.insert(name.to_string(), provider);
        self
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.agents.get(name).map(|p| p.call_count()).unwrap_or(0)
    }

    pub fn requests_for(&self, name: &str) -> Vec<ProviderRequest> {
        self.agents.get(name).map(|p| p.requests()).unwrap_or_default()
    }
}

/// The agent a request was built for, read from "You are <name>".
pub fn requesting_agent(request: &ProviderRequest) -> Option<String> {
    let prompt = &request.messages.first()?.content;
    let rest = prompt.strip_prefix("You are ")?;
    let end = rest.find([',', '.']).unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

#[async_trait::async_trait]
impl Provider for AgentScripts {
    fn name(&self) -> &str {
        "agent_scripts"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let agent = requesting_agent(&request).unwrap_or_default();
        let provider = self
            .agents
            .get(&agent)
            .unwrap_or_else(|| panic!("AgentScripts: no script for agent {agent:?}"));
        provider.complete(request).await
    }
}

/// Structured reply with only a final answer.
pub fn final_reply(text: &str, continue_: bool) -> String {
    serde_json::json!({
        "analysis": "",
        "commentary": "",
        "final": text,
        "metadata": {
            "continue": continue_,
            "reason": if continue_ { "more work to do" } else { "task complete" },
        }
    })
    .to_string()
}

/// Structured reply requesting one tool call.
pub fn tool_reply(tool: &str, parameters: serde_json::Value, continue_: bool) -> String {
    serde_json::json!({
        "analysis": "",
        "commentary": format!("calling {tool}"),
        "final": "",
        "metadata": {
            "continue": continue_,
            "reason": "awaiting tool result",
            "tool_calls": [{"tool": tool, "parameters": parameters}],
        }
    })
    .to_string()
}
