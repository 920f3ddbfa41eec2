//! The agent side of Swarmline.
//!
//! An agent's work proceeds in iterations:
//!
//! 1. **Build** the request from the session history and the system prompt
//! 2. **Complete** it through the configured provider
//! 3. **Decode** the raw output into channels (analysis, commentary, final)
//! 4. **Execute** the requested tool calls and fold the results back in
//! 5. **Evaluate** the continuation decision against the iteration bounds
//!
//! [`SessionController`] runs that loop for one session; [`AgentRuntime`]
//! owns every session, the mailbox and the single active-agent slot.

pub mod capabilities;
pub mod continuation;
pub mod controller;
pub mod prompt;
pub mod runtime;
pub mod session;
pub mod stream_event;
pub mod switch;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use continuation::{ContinuationEngine, EngineState, Verdict};
pub use controller::{DriveOutcome, DriveStatus, SessionController, Step, TurnContext};
pub use runtime::{AgentRuntime, AgentStatus, RuntimeBuilder, RuntimeStatus};
pub use session::{AgentSession, HistoryEntry};
pub use stream_event::{EventSink, RuntimeEvent};
pub use switch::{SwitchCoordinator, SwitchKind, SwitchRecord};
