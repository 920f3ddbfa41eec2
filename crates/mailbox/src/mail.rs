//! Mail records exchanged between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Parse a priority word, falling back to `Normal`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailStatus {
    #[default]
    Unread,
    Read,
    Replied,
    Archived,
}

/// How the sender waits for the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Enqueue and return immediately
    #[default]
    FireAndForget,
    /// Enqueue and suspend the sender until a reply, timeout or cancellation
    Blocking,
}

impl DeliveryMode {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" | "sync" | "wait" => Self::Blocking,
            _ => Self::FireAndForget,
        }
    }
}

/// Structured message body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailBody {
    #[serde(default)]
    pub purpose: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_action: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl MailBody {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requested_action(mut self, action: impl Into<String>) -> Self {
        self.requested_action = Some(action.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A message as submitted by a sender, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: MailBody,
}

impl NewMail {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: MailBody,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body,
        }
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: MailBody,
    pub delivered_at: DateTime<Utc>,
    pub read: bool,
    pub status: MailStatus,
    pub mode: DeliveryMode,

    /// The message this one answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Mail {
    pub(crate) fn stamp(new: NewMail, mode: DeliveryMode, reply_to: Option<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            from: new.from,
            to: new.to,
            subject: new.subject,
            body: new.body,
            delivered_at: Utc::now(),
            read: false,
            status: MailStatus::Unread,
            mode,
            reply_to,
        }
    }

    /// Render the mail as the text injected into the recipient's history.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Mail {} from {} [{}]\nSubject: {}\n",
            self.id,
            self.from,
            serde_json::to_value(self.body.priority)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default(),
            self.subject
        );
        if !self.body.purpose.is_empty() {
            out.push_str(&format!("Purpose: {}\n", self.body.purpose));
        }
        out.push_str(&self.body.content);
        if let Some(action) = &self.body.requested_action {
            out.push_str(&format!("\nRequested action: {action}"));
        }
        if !self.body.context.is_empty()
            && let Ok(ctx) = serde_json::to_string(&self.body.context)
        {
            out.push_str(&format!("\nContext: {ctx}"));
        }
        if let Some(original) = &self.reply_to {
            out.push_str(&format!("\n(in reply to {original})"));
        }
        out
    }
}
