//! Agent runtime — owns every session, the mailbox and the active slot.
//!
//! External submissions are serialised behind one async mutex and routed to
//! the active agent. A BLOCKING `send_mail` is implemented as a
//! switch-and-return: the recipient becomes active, its loop is driven inside
//! the sender's task until it answers (or the deadline passes), and control
//! goes back to the sender with the reply as the tool result.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use swarmline_codec::{ChannelCodec, LineBudget};
use swarmline_config::{AppConfig, MailboxConfig, RuntimeConfig};
use swarmline_core::event::{DomainEvent, EventBus};
use swarmline_core::provider::Provider;
use swarmline_core::{
    AgentProfile, ContinuationDecision, Error, MailboxError, Result, ToolCall, ToolDefinition,
    ToolFailureKind, ToolGateway, ToolOutput, ToolRegistry, ToolResult,
};
use swarmline_mailbox::{DeliveryMode, Mail, MailBody, Mailbox, NewMail, Priority, ReplyHandle};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use crate::capabilities::{self, ReplyMailArgs, SendMailArgs, SwitchAgentArgs};
use crate::continuation::EngineState;
use crate::controller::{DriveOutcome, DriveStatus, SessionController, TurnContext};
use crate::session::{AgentSession, HistoryEntry};
use crate::stream_event::RuntimeEvent;
use crate::switch::{SwitchCoordinator, SwitchRecord};

/// Snapshot of one agent for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub name: String,
    pub role: String,
    pub active: bool,
    /// The session is mid-drive and could not be inspected
    pub busy: bool,
    pub state: Option<EngineState>,
    pub last_decision: Option<ContinuationDecision>,
    pub history_len: Option<usize>,
    pub unread_mail: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub active: String,
    pub switch_depth: usize,
    pub pending_requests: usize,
    pub agents: Vec<AgentStatus>,
}

/// Builds an [`AgentRuntime`].
pub struct RuntimeBuilder {
    provider: Arc<dyn Provider>,
    tools: Option<Arc<dyn ToolGateway>>,
    agents: Vec<AgentProfile>,
    initial: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    runtime: RuntimeConfig,
    mailbox: MailboxConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl RuntimeBuilder {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let defaults = AppConfig::default();
        Self {
            provider,
            tools: None,
            agents: Vec::new(),
            initial: None,
            model: defaults.default_model,
            temperature: defaults.default_temperature,
            max_tokens: Some(defaults.default_max_tokens),
            runtime: RuntimeConfig::default(),
            mailbox: MailboxConfig::default(),
            event_bus: None,
        }
    }

    pub fn tools(mut self, tools: Arc<dyn ToolGateway>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn agent(mut self, profile: AgentProfile) -> Self {
        self.agents.push(profile);
        self
    }

    pub fn agents(mut self, profiles: Vec<AgentProfile>) -> Self {
        self.agents.extend(profiles);
        self
    }

    /// The agent that starts out active. Defaults to the first one.
    pub fn initial_agent(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime = config;
        self
    }

    pub fn mailbox_config(mut self, config: MailboxConfig) -> Self {
        self.mailbox = config;
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<AgentRuntime> {
        let mut agents = self.agents;
        if agents.is_empty() {
            agents.push(AgentProfile::new("assistant").with_role("general assistant"));
        }

        let mut sessions = HashMap::new();
        for profile in &agents {
            if profile.name.trim().is_empty() {
                return Err(Error::Config {
                    message: "agent names must not be empty".into(),
                });
            }
            let session = Arc::new(AsyncMutex::new(AgentSession::new(profile.clone())));
            if sessions.insert(profile.name.clone(), session).is_some() {
                return Err(Error::Config {
                    message: format!("duplicate agent name: {}", profile.name),
                });
            }
        }

        let initial = self
            .initial
            .unwrap_or_else(|| agents[0].name.clone());
        let names: Vec<String> = agents.iter().map(|a| a.name.clone()).collect();
        let switches = SwitchCoordinator::new(names.clone(), &initial, self.mailbox.max_switch_depth)?;

        let mailbox = Mailbox::new(self.mailbox.default_deadline());
        for name in names {
            mailbox.register(name);
        }

        let event_bus = self.event_bus.unwrap_or_default();
        let codec = ChannelCodec::new(LineBudget {
            normal: self.runtime.final_line_budget,
            detailed: self.runtime.detailed_line_budget,
        });
        let controller = SessionController::new(self.provider, self.model, event_bus.clone())
            .with_codec(codec)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_ceiling(self.runtime.iteration_ceiling)
            .with_task_bound(self.runtime.task_max_iterations)
            .with_discipline(self.runtime.tool_discipline)
            .with_roster(agents.clone());

        info!(
            agents = agents.len(),
            active = %initial,
            ceiling = self.runtime.iteration_ceiling,
            discipline = ?self.runtime.tool_discipline,
            "Agent runtime ready"
        );

        Ok(AgentRuntime {
            inner: Arc::new(RuntimeInner {
                controller,
                tools: self.tools.unwrap_or_else(|| Arc::new(ToolRegistry::new())),
                profiles: agents,
                sessions,
                mailbox,
                switches: Mutex::new(switches),
                max_deadline_secs: self.mailbox.max_deadline_secs,
                drive_lock: AsyncMutex::new(()),
                event_bus,
            }),
        })
    }
}

/// The process-wide multi-agent runtime. Cheap to clone.
#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

impl AgentRuntime {
    pub fn builder(provider: Arc<dyn Provider>) -> RuntimeBuilder {
        RuntimeBuilder::new(provider)
    }

    /// Build a runtime from application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolGateway>,
    ) -> Result<Self> {
        RuntimeBuilder::new(provider)
            .tools(tools)
            .agents(config.effective_agents())
            .initial_agent(config.initial_agent())
            .model(&config.default_model)
            .temperature(config.default_temperature)
            .max_tokens(Some(config.default_max_tokens))
            .runtime_config(config.runtime.clone())
            .mailbox_config(config.mailbox.clone())
            .build()
    }

    /// Route user input to the active agent and drive it until TERMINATE.
    pub async fn submit(&self, input: &str, ctx: TurnContext) -> Result<DriveOutcome> {
        let _turn = self.inner.drive_lock.lock().await;
        self.inner.run_active(input, &ctx).await
    }

    /// Make `to` the active agent, carrying a summary of the current one.
    pub async fn switch_to(
        &self,
        to: &str,
        reason: &str,
        summary: Option<String>,
    ) -> Result<SwitchRecord> {
        let _turn = self.inner.drive_lock.lock().await;
        let from = self.active_agent();
        let summary = match summary {
            Some(summary) => summary,
            None => self.inner.session(&from)?.lock().await.summary(6),
        };
        self.inner.switch(&from, to, reason, &summary, None).await
    }

    pub fn active_agent(&self) -> String {
        self.inner.switches.lock().active().to_string()
    }

    pub fn agents(&self) -> &[AgentProfile] {
        &self.inner.profiles
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.inner.mailbox
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.inner.event_bus.clone()
    }

    pub fn switch_log(&self) -> Vec<SwitchRecord> {
        self.inner.switches.lock().log().to_vec()
    }

    /// A copy of `agent`'s history. Waits if the agent is mid-drive.
    pub async fn history(&self, agent: &str) -> Result<Vec<HistoryEntry>> {
        let session = self.inner.session(agent)?;
        let session = session.lock().await;
        Ok(session.history().to_vec())
    }

    pub fn status(&self) -> RuntimeStatus {
        let (active, switch_depth) = {
            let switches = self.inner.switches.lock();
            (switches.active().to_string(), switches.depth())
        };

        let agents = self
            .inner
            .profiles
            .iter()
            .map(|profile| {
                let snapshot = self
                    .inner
                    .sessions
                    .get(&profile.name)
                    .and_then(|s| s.try_lock().ok())
                    .map(|s| (s.state(), s.last_decision().cloned(), s.history().len()));
                let busy = snapshot.is_none();
                let (state, last_decision, history_len) = match snapshot {
                    Some((state, decision, len)) => (Some(state), decision, Some(len)),
                    None => (None, None, None),
                };
                AgentStatus {
                    name: profile.name.clone(),
                    role: profile.role.clone(),
                    active: profile.name == active,
                    busy,
                    state,
                    last_decision,
                    history_len,
                    unread_mail: self.inner.mailbox.unread_count(&profile.name),
                }
            })
            .collect();

        RuntimeStatus {
            active,
            switch_depth,
            pending_requests: self.inner.mailbox.pending_count(),
            agents,
        }
    }
}

struct RuntimeInner {
    controller: SessionController,
    tools: Arc<dyn ToolGateway>,
    profiles: Vec<AgentProfile>,
    sessions: HashMap<String, Arc<AsyncMutex<AgentSession>>>,
    mailbox: Mailbox,
    switches: Mutex<SwitchCoordinator>,
    max_deadline_secs: u64,
    drive_lock: AsyncMutex<()>,
    event_bus: Arc<EventBus>,
}

impl RuntimeInner {
    fn session(&self, agent: &str) -> Result<Arc<AsyncMutex<AgentSession>>> {
        self.sessions
            .get(agent)
            .cloned()
            .ok_or_else(|| Error::UnknownAgent(agent.to_string()))
    }

    fn gateway(self: &Arc<Self>, agent: &str, ctx: &TurnContext) -> AgentGateway {
        AgentGateway {
            runtime: self.clone(),
            agent: agent.to_string(),
            ctx: ctx.clone(),
        }
    }

    async fn run_active(self: &Arc<Self>, input: &str, ctx: &TurnContext) -> Result<DriveOutcome> {
        let agent = self.switches.lock().active().to_string();
        let session = self.session(&agent)?;
        let mut session = session.lock().await;

        for mail in self.mailbox.check(&agent)? {
            session.inject_system(format!("New mail:\n{}", mail.render()));
        }
        session.push_user(input);

        info!(agent = %agent, "Driving active agent");
        let gateway = self.gateway(&agent, ctx);
        let outcome = self.controller.drive(&mut session, &gateway, ctx).await;

        if outcome.status == DriveStatus::Cancelled {
            let cancelled = self.mailbox.cancel_all(&agent);
            if cancelled > 0 {
                info!(agent = %agent, cancelled, "Cancelled outstanding blocking requests");
            }
        }

        ctx.emit(RuntimeEvent::Done {
            agent,
            status: outcome.status.clone(),
            iterations: outcome.iterations,
        });
        Ok(outcome)
    }

    /// Drive `agent` on the mail waiting in its inbox.
    fn drive_recipient<'a>(
        self: &'a Arc<Self>,
        agent: &'a str,
        ctx: &'a TurnContext,
    ) -> BoxFuture<'a, Result<DriveOutcome>> {
        async move {
            let session = self.session(agent)?;
            let mut session = session.lock().await;
            for mail in self.mailbox.check(agent)? {
                session.push_user(incoming_mail_prompt(&mail));
            }
            let gateway = self.gateway(agent, ctx);
            Ok(self.controller.drive(&mut session, &gateway, ctx).await)
        }
        .boxed()
    }

    async fn switch(
        &self,
        from: &str,
        to: &str,
        reason: &str,
        summary: &str,
        ctx: Option<&TurnContext>,
    ) -> Result<SwitchRecord> {
        let record = self.switches.lock().switch(from, to, reason)?;

        let mut note = format!("Control was handed to you by {from}. Reason: {reason}");
        if !summary.trim().is_empty() {
            note.push_str(&format!("\nContext:\n{summary}"));
        }
        self.session(to)?.lock().await.inject_system(note);

        self.announce(&record, ctx);
        Ok(record)
    }

    fn announce(&self, record: &SwitchRecord, ctx: Option<&TurnContext>) {
        self.event_bus.publish(DomainEvent::AgentSwitched {
            from: record.from.clone(),
            to: record.to.clone(),
            reason: record.reason.clone(),
            timestamp: record.at,
        });
        if let Some(ctx) = ctx {
            ctx.emit(RuntimeEvent::Switched {
                from: record.from.clone(),
                to: record.to.clone(),
                reason: record.reason.clone(),
            });
        }
    }

    async fn send_mail(self: &Arc<Self>, from: &str, call: &ToolCall, ctx: &TurnContext) -> ToolResult {
        let args: SendMailArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return ToolResult::failure(call, ToolFailureKind::InvalidParameters, e.to_string()),
        };
        let mode = args
            .mode
            .as_deref()
            .map(DeliveryMode::parse_lenient)
            .unwrap_or_default();

        if mode == DeliveryMode::Blocking {
            let preflight = self.switches.lock().check_enter(&args.to);
            if let Err(e) = preflight {
                warn!(from = %from, to = %args.to, error = %e, "Blocking send refused");
                return error_result(call, &e);
            }
        }

        let mut body = MailBody::new(args.content).with_purpose(args.purpose);
        if let Some(priority) = args.priority.as_deref() {
            body = body.with_priority(Priority::parse_lenient(priority));
        }
        if let Some(action) = args.requested_action {
            body = body.with_requested_action(action);
        }
        for (key, value) in args.context {
            body = body.with_context(key, value);
        }
        if let Some(secs) = args.deadline_secs {
            let deadline = (secs <= self.max_deadline_secs)
                .then(|| i64::try_from(secs).ok())
                .flatten()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|wait| chrono::Utc::now().checked_add_signed(wait));
            match deadline {
                Some(deadline) => body = body.with_deadline(deadline),
                None => {
                    return ToolResult::failure(
                        call,
                        ToolFailureKind::InvalidParameters,
                        format!(
                            "deadline_secs must be at most {} (got {secs})",
                            self.max_deadline_secs
                        ),
                    );
                }
            }
        }

        let subject = if args.subject.is_empty() {
            format!("Message from {from}")
        } else {
            args.subject
        };
        let sent = match self.mailbox.send(NewMail::new(from, &args.to, subject, body), mode) {
            Ok(sent) => sent,
            Err(e) => return mailbox_failure(call, &e),
        };
        self.event_bus.publish(DomainEvent::MailSent {
            message_id: sent.message_id.clone(),
            from: from.to_string(),
            to: args.to.clone(),
            blocking: sent.reply.is_some(),
            timestamp: chrono::Utc::now(),
        });

        match sent.reply {
            None => ToolResult::success(
                call,
                ToolOutput {
                    output: format!("Mail {} delivered to {}", sent.message_id, args.to),
                    data: Some(serde_json::json!({ "message_id": sent.message_id })),
                },
            ),
            Some(handle) => self.switch_and_return(from, &args.to, handle, call, ctx).await,
        }
    }

    async fn switch_and_return(
        self: &Arc<Self>,
        from: &str,
        to: &str,
        handle: ReplyHandle,
        call: &ToolCall,
        ctx: &TurnContext,
    ) -> ToolResult {
        let message_id = handle.message_id().to_string();

        let entered = self.switches.lock().enter(to, &format!("blocking mail from {from}"));
        let record = match entered {
            Ok(record) => record,
            Err(e) => {
                let _ = self.mailbox.cancel(&message_id);
                return error_result(call, &e);
            }
        };
        self.announce(&record, Some(ctx));
        let mut wait = NestedWait::new(self, &message_id);

        // Set when the recipient stopped without answering.
        let mut unanswered = None;
        match tokio::time::timeout_at(handle.deadline(), self.drive_recipient(to, ctx)).await {
            Ok(Ok(outcome)) => match &outcome.status {
                DriveStatus::Completed => self.auto_reply(from, &message_id, to, &outcome),
                DriveStatus::Cancelled => {
                    let _ = self.mailbox.cancel(&message_id);
                }
                DriveStatus::LoopLimit | DriveStatus::Failed { .. } => {
                    if self.mailbox.cancel(&message_id).is_ok() {
                        unanswered = Some(recipient_failure(to, &outcome));
                    }
                }
            },
            Ok(Err(e)) => {
                warn!(to = %to, error = %e, "Recipient could not be driven");
                if self.mailbox.cancel(&message_id).is_ok() {
                    unanswered = Some(format!("{to} could not be driven: {e}"));
                }
            }
            Err(_) => {
                warn!(from = %from, to = %to, message_id = %message_id, "Recipient did not answer before the deadline");
                self.abandon(from, to, &message_id).await;
            }
        }

        wait.disarm();
        let returned = self.switches.lock().leave(&format!("{to} finished"));
        if let Some(record) = returned {
            self.announce(&record, Some(ctx));
        }

        let (result, outcome) = match self.mailbox.await_reply(handle).await {
            Ok(reply) => (
                ToolResult::success(
                    call,
                    ToolOutput {
                        output: reply.body.content.clone(),
                        data: Some(serde_json::json!({
                            "message_id": message_id,
                            "reply_id": reply.id,
                            "from": reply.from,
                        })),
                    },
                ),
                "replied",
            ),
            Err(e) => match unanswered {
                Some(reason) => (
                    ToolResult::failure(call, ToolFailureKind::ExecutionError, reason),
                    "failed",
                ),
                None => {
                    let outcome = match e {
                        MailboxError::Timeout { .. } => "timeout",
                        _ => "cancelled",
                    };
                    (mailbox_failure(call, &e), outcome)
                }
            },
        };
        self.event_bus.publish(DomainEvent::MailResolved {
            message_id,
            outcome: outcome.into(),
            timestamp: chrono::Utc::now(),
        });
        result
    }

    /// Tell a recipient cut off by the deadline that its answer is no longer awaited.
    async fn abandon(&self, waiter: &str, recipient: &str, message_id: &str) {
        let Ok(session) = self.session(recipient) else {
            return;
        };
        session.lock().await.inject_system(format!(
            "Your work on message {message_id} from {waiter} was abandoned: \
             the reply deadline passed before you answered."
        ));
    }

    /// Answer on the recipient's behalf when its drive ended without `reply_mail`.
    fn auto_reply(&self, waiter: &str, message_id: &str, responder: &str, outcome: &DriveOutcome) {
        let still_pending = self
            .mailbox
            .pending_for(waiter)
            .iter()
            .any(|p| p.message_id == message_id);
        if !still_pending {
            return;
        }

        let content = if outcome.final_text().trim().is_empty() {
            format!("{responder} finished without an answer.")
        } else {
            outcome.final_text().to_string()
        };
        match self
            .mailbox
            .reply(message_id, MailBody::new(content).with_purpose("answer"))
        {
            Ok(reply_id) => debug!(message_id = %message_id, reply_id = %reply_id, "Replied with recipient's final answer"),
            Err(e) => warn!(message_id = %message_id, error = %e, "Automatic reply failed"),
        }
    }

    fn check_mail(&self, agent: &str, call: &ToolCall) -> ToolResult {
        match self.mailbox.check(agent) {
            Ok(mail) if mail.is_empty() => ToolResult::success(call, ToolOutput::text("No new mail.")),
            Ok(mail) => {
                let ids: Vec<&str> = mail.iter().map(|m| m.id.as_str()).collect();
                let text = mail.iter().map(Mail::render).collect::<Vec<_>>().join("\n\n");
                ToolResult::success(
                    call,
                    ToolOutput {
                        output: text,
                        data: Some(serde_json::json!({ "count": mail.len(), "ids": ids })),
                    },
                )
            }
            Err(e) => mailbox_failure(call, &e),
        }
    }

    fn reply_mail(&self, agent: &str, call: &ToolCall) -> ToolResult {
        let args: ReplyMailArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return ToolResult::failure(call, ToolFailureKind::InvalidParameters, e.to_string()),
        };
        let body = MailBody::new(args.content).with_purpose(args.purpose);
        match self.mailbox.reply(&args.message_id, body) {
            Ok(reply_id) => {
                debug!(agent = %agent, message_id = %args.message_id, reply_id = %reply_id, "Mail replied");
                ToolResult::success(
                    call,
                    ToolOutput {
                        output: format!("Reply {reply_id} sent"),
                        data: Some(serde_json::json!({ "reply_id": reply_id })),
                    },
                )
            }
            Err(e) => mailbox_failure(call, &e),
        }
    }

    async fn switch_agent(&self, from: &str, call: &ToolCall, ctx: &TurnContext) -> ToolResult {
        let args: SwitchAgentArgs = match serde_json::from_value(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return ToolResult::failure(call, ToolFailureKind::InvalidParameters, e.to_string()),
        };
        let summary = args.context_summary.unwrap_or_default();
        match self.switch(from, &args.agent, &args.reason, &summary, Some(ctx)).await {
            Ok(record) => ToolResult::success(
                call,
                ToolOutput::text(format!(
                    "{} is now active and will handle the next message.",
                    record.to
                )),
            ),
            Err(e) => error_result(call, &e),
        }
    }
}

/// Unwinds one switch-and-return level when a blocking wait is dropped
/// before it finishes, so the stack and the pending request never leak.
struct NestedWait<'a> {
    runtime: &'a RuntimeInner,
    message_id: String,
    armed: bool,
}

impl<'a> NestedWait<'a> {
    fn new(runtime: &'a RuntimeInner, message_id: &str) -> Self {
        Self {
            runtime,
            message_id: message_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for NestedWait<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let _ = self.runtime.mailbox.cancel(&self.message_id);
        let returned = self.runtime.switches.lock().leave("blocking wait dropped");
        if let Some(record) = returned {
            warn!(message_id = %self.message_id, to = %record.to, "Blocking wait dropped before it finished");
            self.runtime.announce(&record, None);
        }
    }
}

/// Tool gateway scoped to one agent: runtime capabilities plus the registry.
struct AgentGateway {
    runtime: Arc<RuntimeInner>,
    agent: String,
    ctx: TurnContext,
}

#[async_trait::async_trait]
impl ToolGateway for AgentGateway {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.runtime.tools.definitions();
        defs.extend(capabilities::definitions());
        defs
    }

    fn contains(&self, name: &str) -> bool {
        capabilities::is_capability(name) || self.runtime.tools.contains(name)
    }

    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            capabilities::SEND_MAIL => self.runtime.send_mail(&self.agent, call, &self.ctx).await,
            capabilities::CHECK_MAIL => self.runtime.check_mail(&self.agent, call),
            capabilities::REPLY_MAIL => self.runtime.reply_mail(&self.agent, call),
            capabilities::SWITCH_AGENT => self.runtime.switch_agent(&self.agent, call, &self.ctx).await,
            _ => self.runtime.tools.invoke(call).await,
        }
    }
}

fn recipient_failure(recipient: &str, outcome: &DriveOutcome) -> String {
    let kind = outcome
        .error_kind()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "UNKNOWN".into());
    let detail = match &outcome.status {
        DriveStatus::Failed { message, .. } => message.clone(),
        _ => outcome.final_text().to_string(),
    };
    format!("{recipient} stopped without answering [{kind}]: {detail}")
}

fn incoming_mail_prompt(mail: &Mail) -> String {
    format!(
        "You received mail. Answer it in your final channel, or with reply_mail.\n\n{}",
        mail.render()
    )
}

fn mailbox_failure(call: &ToolCall, err: &MailboxError) -> ToolResult {
    let kind = match err {
        MailboxError::Timeout { .. } => ToolFailureKind::Timeout,
        MailboxError::UnknownRecipient(_) | MailboxError::UnknownMessage(_) => ToolFailureKind::NotFound,
        MailboxError::InvalidMessage(_) | MailboxError::SelfSend(_) => ToolFailureKind::InvalidParameters,
        MailboxError::Cancelled { .. }
        | MailboxError::Cycle { .. }
        | MailboxError::SwitchDepthExceeded { .. }
        | MailboxError::SwitchRejected(_) => ToolFailureKind::ExecutionError,
    };
    ToolResult::failure(call, kind, err.to_string())
}

fn error_result(call: &ToolCall, err: &Error) -> ToolResult {
    match err {
        Error::Mailbox(e) => mailbox_failure(call, e),
        Error::Tool(e) => ToolResult::from_error(call, e),
        Error::UnknownAgent(name) => {
            ToolResult::failure(call, ToolFailureKind::NotFound, format!("Unknown agent: {name}"))
        }
        other => ToolResult::failure(call, ToolFailureKind::ExecutionError, other.to_string()),
    }
}
