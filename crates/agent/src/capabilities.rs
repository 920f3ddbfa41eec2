//! Runtime capabilities exposed to agents as tools.
//!
//! These four are served by the runtime itself rather than the tool registry,
//! because they act on the mailbox and the active-agent slot.

use serde::Deserialize;
use std::collections::BTreeMap;
use swarmline_core::ToolDefinition;

pub const SEND_MAIL: &str = "send_mail";
pub const CHECK_MAIL: &str = "check_mail";
pub const REPLY_MAIL: &str = "reply_mail";
pub const SWITCH_AGENT: &str = "switch_agent";

pub fn is_capability(name: &str) -> bool {
    matches!(name, SEND_MAIL | CHECK_MAIL | REPLY_MAIL | SWITCH_AGENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMailArgs {
    #[serde(alias = "to_agent")]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(alias = "body")]
    pub content: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub requested_action: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyMailArgs {
    pub message_id: String,
    #[serde(alias = "body")]
    pub content: String,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SwitchAgentArgs {
    #[serde(alias = "agent_id")]
    pub agent: String,
    pub reason: String,
    #[serde(default)]
    pub context_summary: Option<String>,
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SEND_MAIL.into(),
            description: "Send mail to another agent. With mode \"blocking\" you wait for \
                          their answer and receive it as this tool's result."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string", "description": "Recipient agent name"},
                    "subject": {"type": "string"},
                    "content": {"type": "string", "description": "Message text"},
                    "purpose": {"type": "string"},
                    "priority": {"type": "string", "enum": ["low", "normal", "high", "urgent"]},
                    "mode": {"type": "string", "enum": ["fire_and_forget", "blocking"]},
                    "requested_action": {"type": "string"},
                    "context": {"type": "object"},
                    "deadline_secs": {"type": "integer", "description": "Seconds to wait for a blocking reply"}
                },
                "required": ["to", "content"]
            }),
        },
        ToolDefinition {
            name: CHECK_MAIL.into(),
            description: "Read your unread mail, oldest first.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: REPLY_MAIL.into(),
            description: "Reply to a message you received.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "message_id": {"type": "string"},
                    "content": {"type": "string"},
                    "purpose": {"type": "string"}
                },
                "required": ["message_id", "content"]
            }),
        },
        ToolDefinition {
            name: SWITCH_AGENT.into(),
            description: "Hand the conversation to another agent.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "reason": {"type": "string"},
                    "context_summary": {"type": "string"}
                },
                "required": ["agent", "reason"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_definition_is_a_capability() {
        let defs = definitions();
        assert_eq!(defs.len(), 4);
        assert!(defs.iter().all(|d| is_capability(&d.name)));
        assert!(!is_capability("read_file"));
    }

    #[test]
    fn send_mail_args_accept_aliases() {
        let args: SendMailArgs = serde_json::from_value(serde_json::json!({
            "to_agent": "bob",
            "body": "What is 2+2?",
            "mode": "blocking"
        }))
        .unwrap();
        assert_eq!(args.to, "bob");
        assert_eq!(args.content, "What is 2+2?");
        assert_eq!(args.mode.as_deref(), Some("blocking"));
        assert!(args.context.is_empty());
    }

    #[test]
    fn switch_args_require_reason() {
        let result: Result<SwitchAgentArgs, _> =
            serde_json::from_value(serde_json::json!({"agent": "bob"}));
        assert!(result.is_err());
    }
}
