//! Domain event system — decoupled observation of runtime activity.
//!
//! The runtime publishes an event whenever a turn starts, a response is
//! decoded, a tool runs, mail moves or the active agent changes. Observers
//! (the gateway, logs, tests) subscribe without coupling to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::channel::Continuation;
use crate::error::ErrorKind;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An agent began an iteration
    TurnStarted {
        agent: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// Model output was decoded into channels
    ResponseParsed {
        agent: String,
        tool_calls: usize,
        continuation: Continuation,
        warnings: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        agent: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Mail was enqueued for a recipient
    MailSent {
        message_id: String,
        from: String,
        to: String,
        blocking: bool,
        timestamp: DateTime<Utc>,
    },

    /// A blocking request was resolved (reply, timeout or cancellation)
    MailResolved {
        message_id: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },

    /// The active agent changed
    AgentSwitched {
        from: String,
        to: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The global iteration ceiling stopped a drive
    LoopLimitReached {
        agent: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        agent: String,
        kind: Option<ErrorKind>,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
