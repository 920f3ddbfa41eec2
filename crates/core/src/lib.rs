//! # Swarmline Core
//!
//! Domain types, traits, and error definitions for the Swarmline multi-agent
//! session runtime. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the session loop is defined as a trait here
//! ([`Provider`], [`Tool`], [`ToolGateway`]). Implementations live in their
//! respective crates, so tests can drive the runtime with scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, MailboxError, ProtocolError, ProviderError, Result, ToolError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use channel::{ChannelResponse, Continuation, ContinuationDecision, NO_CONTINUATION_SIGNAL, Progress};
pub use tool::{
    Tool, ToolCall, ToolFailureKind, ToolGateway, ToolOutcome, ToolOutput, ToolRegistry, ToolResult,
};
pub use agent::{AgentProfile, ToolDiscipline};
pub use event::{DomainEvent, EventBus};
