//! Agent switch coordinator — owns the single "active" slot.
//!
//! Explicit switches hand the slot to another agent and leave the previous
//! one resumable. Blocking mail nests: the sender is pushed onto a bounded
//! stack while the recipient runs, and popped back when it returns. A
//! recipient already on the stack would wait on its own waiter, so it is
//! rejected as a cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarmline_core::{Error, MailboxError, Result};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    /// Requested by an agent or the client
    Explicit,
    /// Entered for a blocking send
    Blocking,
    /// Returned from a blocking send
    Return,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub from: String,
    pub to: String,
    pub reason: String,
    pub kind: SwitchKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SwitchCoordinator {
    agents: Vec<String>,
    active: String,
    stack: Vec<String>,
    max_depth: usize,
    log: Vec<SwitchRecord>,
}

impl SwitchCoordinator {
    pub fn new<I, S>(agents: I, initial: &str, max_depth: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agents: Vec<String> = agents.into_iter().map(Into::into).collect();
        if !agents.iter().any(|a| a == initial) {
            return Err(Error::UnknownAgent(initial.to_string()));
        }
        Ok(Self {
            agents,
            active: initial.to_string(),
            stack: Vec::new(),
            max_depth: max_depth.max(1),
            log: Vec::new(),
        })
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn is_known(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }

    /// Agents suspended on blocking sends, outermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn log(&self) -> &[SwitchRecord] {
        &self.log
    }

    /// Hand the active slot from `from` to `to`.
    pub fn switch(&mut self, from: &str, to: &str, reason: &str) -> Result<SwitchRecord> {
        if !self.is_known(to) {
            return Err(Error::UnknownAgent(to.to_string()));
        }
        if from != self.active {
            return Err(MailboxError::SwitchRejected(format!(
                "{from} is not the active agent ({} is)",
                self.active
            ))
            .into());
        }
        if to == self.active {
            return Err(MailboxError::SwitchRejected(format!("{to} is already active")).into());
        }
        if !self.stack.is_empty() {
            return Err(MailboxError::SwitchRejected(format!(
                "{from} is answering a blocking request"
            ))
            .into());
        }
        Ok(self.record(to, reason, SwitchKind::Explicit))
    }

    /// Check that a blocking send from the active agent to `to` may nest.
    pub fn check_enter(&self, to: &str) -> Result<()> {
        if !self.is_known(to) {
            return Err(Error::UnknownAgent(to.to_string()));
        }
        if to == self.active || self.stack.iter().any(|a| a == to) {
            let mut chain = self.stack.clone();
            chain.push(self.active.clone());
            chain.push(to.to_string());
            return Err(MailboxError::Cycle { chain }.into());
        }
        if self.stack.len() >= self.max_depth {
            return Err(MailboxError::SwitchDepthExceeded {
                max_depth: self.max_depth,
            }
            .into());
        }
        Ok(())
    }

    /// Suspend the active agent and activate `to` for a blocking send.
    pub fn enter(&mut self, to: &str, reason: &str) -> Result<SwitchRecord> {
        self.check_enter(to)?;
        self.stack.push(self.active.clone());
        Ok(self.record(to, reason, SwitchKind::Blocking))
    }

    /// Return the slot to the innermost suspended agent.
    pub fn leave(&mut self, reason: &str) -> Option<SwitchRecord> {
        let previous = self.stack.pop()?;
        Some(self.record(&previous, reason, SwitchKind::Return))
    }

    fn record(&mut self, to: &str, reason: &str, kind: SwitchKind) -> SwitchRecord {
        let record = SwitchRecord {
            from: std::mem::replace(&mut self.active, to.to_string()),
            to: to.to_string(),
            reason: reason.to_string(),
            kind,
            at: Utc::now(),
        };
        info!(from = %record.from, to = %record.to, kind = ?kind, depth = self.stack.len(), "Active agent switched");
        self.log.push(record.clone());
        record
    }
}
