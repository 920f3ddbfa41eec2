//! Session loop controller — drives one agent's iterate-call-evaluate cycle.
//!
//! Each iteration requests a completion, decodes it into channels, runs at
//! most one tool call (or the whole batch under batch discipline), folds the
//! results into history and asks the continuation engine whether to go on.
//! The controller is shared by every session; the tool gateway is passed per
//! drive so the runtime can scope capabilities to the calling agent.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use swarmline_codec::ChannelCodec;
use swarmline_core::event::{DomainEvent, EventBus};
use swarmline_core::provider::{Provider, ProviderRequest};
use swarmline_core::{
    AgentProfile, ChannelResponse, Continuation, ContinuationDecision, Error, ErrorKind, Result, ToolCall,
    ToolDiscipline, ToolError, ToolFailureKind, ToolGateway, ToolResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::continuation::{CEILING_REASON, ContinuationEngine, DEFAULT_CEILING, EngineState, Verdict};
use crate::prompt;
use crate::session::AgentSession;
use crate::stream_event::{EventSink, RuntimeEvent};

const DEFERRED_REASON: &str = "deferred tool calls pending";

/// Per-drive context: cancellation, event sink and detail level.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub cancel: CancellationToken,
    pub events: Option<EventSink>,
    /// The caller asked for a detailed answer
    pub detailed: bool,
}

impl TurnContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn emit(&self, event: RuntimeEvent) {
        if let Some(sink) = &self.events {
            // A closed sink only means nobody is listening anymore.
            let _ = sink.send(event);
        }
    }
}

/// How a drive ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    Completed,
    LoopLimit,
    Failed {
        kind: Option<ErrorKind>,
        message: String,
    },
    Cancelled,
}

/// The result of driving a session until TERMINATE.
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub agent: String,
    /// Last response; on failure `final` holds a readable statement
    pub response: ChannelResponse,
    pub status: DriveStatus,
    pub iterations: u32,
    pub tool_results: Vec<ToolResult>,
}

impl DriveOutcome {
    pub fn final_text(&self) -> &str {
        &self.response.final_text
    }

    pub fn is_loop_limit(&self) -> bool {
        self.status == DriveStatus::LoopLimit
    }

    /// The taxonomy kind this drive ended with, if it did not complete.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            DriveStatus::Completed | DriveStatus::Cancelled => None,
            DriveStatus::LoopLimit => Some(ErrorKind::LoopLimit),
            DriveStatus::Failed { kind, .. } => *kind,
        }
    }
}

/// One finished iteration.
#[derive(Debug, Clone)]
pub struct Step {
    pub iteration: u32,
    pub response: ChannelResponse,
    pub tool_results: Vec<ToolResult>,
    pub verdict: Verdict,
}

pub struct SessionController {
    provider: Arc<dyn Provider>,
    codec: ChannelCodec,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    ceiling: u32,
    task_bound: Option<u32>,
    discipline: ToolDiscipline,
    roster: Vec<AgentProfile>,
    event_bus: Arc<EventBus>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        Self {
            provider,
            codec: ChannelCodec::default(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            ceiling: DEFAULT_CEILING,
            task_bound: None,
            discipline: ToolDiscipline::default(),
            roster: Vec::new(),
            event_bus,
        }
    }

    pub fn with_codec(mut self, codec: ChannelCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    /// Global iteration ceiling per drive.
    pub fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Task bound for agents whose profile sets none.
    pub fn with_task_bound(mut self, bound: Option<u32>) -> Self {
        self.task_bound = bound;
        self
    }

    pub fn with_discipline(mut self, discipline: ToolDiscipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Agents advertised to each other in the system prompt.
    pub fn with_roster(mut self, roster: Vec<AgentProfile>) -> Self {
        self.roster = roster;
        self
    }

    pub fn codec(&self) -> &ChannelCodec {
        &self.codec
    }

    pub fn discipline(&self) -> ToolDiscipline {
        self.discipline
    }

    /// A fresh engine for `session`'s next task.
    pub fn engine_for(&self, session: &AgentSession) -> ContinuationEngine {
        ContinuationEngine::new(
            self.ceiling,
            session.profile().max_iterations.or(self.task_bound),
        )
    }

    /// Append `input` and run a single iteration.
    pub async fn run_turn(
        &self,
        session: &mut AgentSession,
        input: &str,
        gateway: &dyn ToolGateway,
        ctx: &TurnContext,
    ) -> Result<ChannelResponse> {
        session.push_user(input);
        let mut engine = self.engine_for(session);
        let step = self.step(session, &mut engine, gateway, ctx).await?;
        Ok(step.response)
    }

    /// Append `input` and drive until TERMINATE.
    pub async fn submit(
        &self,
        session: &mut AgentSession,
        input: &str,
        gateway: &dyn ToolGateway,
        ctx: &TurnContext,
    ) -> DriveOutcome {
        session.push_user(input);
        self.drive(session, gateway, ctx).await
    }

    /// Iterate on the current history until the engine terminates.
    pub async fn drive(
        &self,
        session: &mut AgentSession,
        gateway: &dyn ToolGateway,
        ctx: &TurnContext,
    ) -> DriveOutcome {
        let mut engine = self.engine_for(session);
        let mut tool_results = Vec::new();

        loop {
            let step = match self.step(session, &mut engine, gateway, ctx).await {
                Ok(step) => step,
                Err(e) => return self.fail(session, &engine, tool_results, e, ctx),
            };
            tool_results.extend(step.tool_results);

            match step.verdict {
                Verdict::Continue { .. } => continue,
                Verdict::Terminate { reason } => {
                    debug!(agent = %session.name(), iterations = step.iteration, reason = %reason, "Drive terminated");
                    let mut response = step.response;
                    if response.decision.kind == Continuation::Continue {
                        // Stopped by a bound, not by the model.
                        response.decision = ContinuationDecision::terminate(reason);
                    }
                    return DriveOutcome {
                        agent: session.name().to_string(),
                        response,
                        status: DriveStatus::Completed,
                        iterations: step.iteration,
                        tool_results,
                    };
                }
                Verdict::LoopLimit { iterations } => {
                    warn!(agent = %session.name(), iterations, "Iteration ceiling reached");
                    self.event_bus.publish(DomainEvent::LoopLimitReached {
                        agent: session.name().to_string(),
                        iterations,
                        timestamp: chrono::Utc::now(),
                    });
                    let mut response = step.response;
                    if response.final_text.trim().is_empty() {
                        response.final_text =
                            format!("Stopped after {iterations} iterations: iteration ceiling reached.");
                    }
                    response.decision = ContinuationDecision::terminate(CEILING_REASON);
                    return DriveOutcome {
                        agent: session.name().to_string(),
                        response,
                        status: DriveStatus::LoopLimit,
                        iterations,
                        tool_results,
                    };
                }
            }
        }
    }

    /// Run one iteration: completion, decode, tools, continuation.
    pub async fn step(
        &self,
        session: &mut AgentSession,
        engine: &mut ContinuationEngine,
        gateway: &dyn ToolGateway,
        ctx: &TurnContext,
    ) -> Result<Step> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let agent = session.name().to_string();
        let iteration = engine.begin_iteration();
        session.set_state(EngineState::Evaluating);
        self.event_bus.publish(DomainEvent::TurnStarted {
            agent: agent.clone(),
            iteration,
            timestamp: chrono::Utc::now(),
        });
        debug!(agent = %agent, iteration, "Session loop iteration");

        let deferred = session.take_deferred();
        if !deferred.is_empty() {
            session.inject_system(deferred_note(&deferred));
        }

        let line_budget = if ctx.detailed {
            self.codec.budget().detailed
        } else {
            self.codec.budget().normal
        };
        let system_prompt = prompt::system_prompt(session.profile(), &self.roster, line_budget);
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: session.to_messages(&system_prompt, &self.codec),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: gateway
                .definitions()
                .into_iter()
                .filter(|d| session.permits(&d.name))
                .collect(),
        };

        // In-flight calls run to completion; cancellation is observed between them.
        let raw = self.provider.complete(request).await?;

        let decoded = if ctx.detailed {
            self.codec.decode_detailed(&raw.content)?
        } else {
            self.codec.decode(&raw.content)?
        };
        let warnings: Vec<String> = decoded.warnings.iter().map(|w| w.to_string()).collect();
        for warning in &warnings {
            warn!(agent = %agent, iteration, warning = %warning, "Channel protocol deviation");
            ctx.emit(RuntimeEvent::Warning {
                agent: agent.clone(),
                message: warning.clone(),
            });
        }

        let response = decoded.response;
        self.event_bus.publish(DomainEvent::ResponseParsed {
            agent: agent.clone(),
            tool_calls: response.tool_calls.len(),
            continuation: response.continuation(),
            warnings,
            timestamp: chrono::Utc::now(),
        });
        session.push_assistant(response.clone());

        if !response.commentary.trim().is_empty() {
            ctx.emit(RuntimeEvent::Commentary {
                agent: agent.clone(),
                content: response.commentary.clone(),
            });
        }
        if !response.final_text.trim().is_empty() {
            ctx.emit(RuntimeEvent::Final {
                agent: agent.clone(),
                content: response.final_text.clone(),
            });
        }

        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut calls = response.tool_calls.clone();
        let postponed = match self.discipline {
            ToolDiscipline::Single if calls.len() > 1 => calls.split_off(1),
            _ => Vec::new(),
        };

        let mut tool_results = Vec::with_capacity(calls.len());
        for call in calls {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = self.invoke(session, &call, gateway, ctx).await?;
            tool_results.push(result);
        }
        if !tool_results.is_empty() && ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !postponed.is_empty() {
            info!(agent = %agent, deferred = postponed.len(), "Deferring extra tool calls to the next iteration");
        }
        let forced = (!postponed.is_empty()).then_some(DEFERRED_REASON);
        session.defer(postponed);

        let verdict = engine.evaluate(&response.decision, forced);
        session.set_state(engine.state());
        let decision = verdict.decision();
        session.set_last_decision(decision.clone());
        ctx.emit(RuntimeEvent::Continuation {
            agent,
            iteration,
            decision,
        });

        Ok(Step {
            iteration,
            response,
            tool_results,
            verdict,
        })
    }

    /// Run one permitted call and fold its result into history.
    async fn invoke(
        &self,
        session: &mut AgentSession,
        call: &ToolCall,
        gateway: &dyn ToolGateway,
        ctx: &TurnContext,
    ) -> Result<ToolResult> {
        let agent = session.name().to_string();

        if !session.permits(&call.name) {
            let err = ToolError::PermissionDenied {
                tool_name: call.name.clone(),
                reason: format!("not permitted for agent {agent}"),
            };
            warn!(agent = %agent, tool = %call.name, "Tool not in permitted set");
            let result = ToolResult::failure(call, ToolFailureKind::PermissionDenied, err.to_string());
            session.push_tool_result(call.clone(), result);
            return Err(err.into());
        }

        ctx.emit(RuntimeEvent::ToolCall {
            agent: agent.clone(),
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });

        let start = Instant::now();
        let result = gateway.invoke(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(agent = %agent, tool = %call.name, success = result.is_success(), duration_ms, "Tool executed");
        self.event_bus.publish(DomainEvent::ToolExecuted {
            agent: agent.clone(),
            tool_name: call.name.clone(),
            success: result.is_success(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
        ctx.emit(RuntimeEvent::ToolResult {
            agent,
            id: call.id.clone(),
            name: call.name.clone(),
            output: result.render(),
            success: result.is_success(),
        });

        session.push_tool_result(call.clone(), result.clone());
        Ok(result)
    }

    fn fail(
        &self,
        session: &mut AgentSession,
        engine: &ContinuationEngine,
        tool_results: Vec<ToolResult>,
        error: Error,
        ctx: &TurnContext,
    ) -> DriveOutcome {
        let agent = session.name().to_string();
        session.set_state(EngineState::Terminate);

        if matches!(error, Error::Cancelled) {
            info!(agent = %agent, "Drive cancelled");
            session.set_last_decision(ContinuationDecision::terminate("cancelled"));
            return DriveOutcome {
                agent,
                response: ChannelResponse::final_only("Cancelled.")
                    .with_decision(ContinuationDecision::terminate("cancelled")),
                status: DriveStatus::Cancelled,
                iterations: engine.iterations(),
                tool_results,
            };
        }

        let kind = error.kind();
        let message = error.to_string();
        warn!(agent = %agent, kind = ?kind, error = %message, "Drive failed");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            agent: agent.clone(),
            kind,
            error_message: message.clone(),
            timestamp: chrono::Utc::now(),
        });
        ctx.emit(RuntimeEvent::Error {
            agent: agent.clone(),
            kind,
            message: message.clone(),
        });

        let decision = ContinuationDecision::terminate(message.clone());
        session.set_last_decision(decision.clone());
        DriveOutcome {
            agent,
            response: ChannelResponse::final_only(failure_statement(kind, &message))
                .with_decision(decision),
            status: DriveStatus::Failed { kind, message },
            iterations: engine.iterations(),
            tool_results,
        }
    }
}

fn deferred_note(calls: &[ToolCall]) -> String {
    let mut note = String::from(
        "Your previous response requested more than one tool. Only the first ran. \
         Request the remaining calls one at a time:\n",
    );
    for call in calls {
        note.push_str(&format!("- {} {}\n", call.name, call.arguments));
    }
    note
}

fn failure_statement(kind: Option<ErrorKind>, message: &str) -> String {
    match kind {
        Some(ErrorKind::Provider) => {
            format!("I could not reach the language model, so this turn stopped. ({message})")
        }
        Some(ErrorKind::Protocol) => {
            format!("The model returned output I could not use, so this turn stopped. ({message})")
        }
        Some(ErrorKind::Tool) => format!("A tool request was refused, so this turn stopped. ({message})"),
        _ => format!("This turn stopped because of an error. ({message})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, final_reply, tool_reply};
    use swarmline_core::ToolRegistry;
    use swarmline_core::error::ProviderError;
    use swarmline_core::tool::{Tool, ToolOutput};

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text parameter"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(arguments["text"].as_str().unwrap_or_default()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry
    }

    fn controller(provider: Arc<ScriptedProvider>) -> SessionController {
        SessionController::new(provider, "mock-model", Arc::new(EventBus::default()))
    }

    fn session() -> AgentSession {
        AgentSession::new(AgentProfile::new("alice"))
    }

    #[tokio::test]
    async fn plain_text_terminates_after_one_iteration() {
        let provider = Arc::new(ScriptedProvider::new(["Hello"]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let outcome = ctl.submit(&mut s, "hi", &registry(), &TurnContext::new()).await;

        assert_eq!(outcome.status, DriveStatus::Completed);
        assert_eq!(outcome.final_text(), "Hello");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(s.state(), EngineState::Terminate);
        assert_eq!(
            s.last_decision().unwrap().reason,
            swarmline_core::NO_CONTINUATION_SIGNAL
        );
    }

    #[tokio::test]
    async fn tool_result_is_folded_before_next_iteration() {
        let provider = Arc::new(ScriptedProvider::new([
            tool_reply("echo", serde_json::json!({"text": "pong"}), true),
            final_reply("Got pong", false),
        ]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let outcome = ctl.submit(&mut s, "ping", &registry(), &TurnContext::new()).await;

        assert_eq!(outcome.final_text(), "Got pong");
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].is_success());

        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, swarmline_core::Role::Tool);
        assert_eq!(last.content, "pong");
    }

    #[tokio::test]
    async fn terminate_with_tool_runs_tool_then_stops() {
        let provider = Arc::new(ScriptedProvider::new([tool_reply(
            "echo",
            serde_json::json!({"text": "once"}),
            false,
        )]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;
        assert_eq!(outcome.status, DriveStatus::Completed);
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn always_continue_hits_the_ceiling() {
        let provider = Arc::new(ScriptedProvider::repeating(final_reply("still going", true)));
        let ctl = controller(provider.clone()).with_ceiling(5);
        let mut s = session();
        let outcome = ctl.submit(&mut s, "loop", &registry(), &TurnContext::new()).await;

        assert!(outcome.is_loop_limit());
        assert_eq!(outcome.iterations, 5);
        assert_eq!(provider.call_count(), 5);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::LoopLimit));
        assert_eq!(outcome.response.decision.reason, "iteration ceiling reached");
    }

    #[tokio::test]
    async fn profile_task_bound_wins_over_ceiling() {
        let provider = Arc::new(ScriptedProvider::repeating(final_reply("again", true)));
        let ctl = controller(provider.clone()).with_ceiling(10);
        let mut s = AgentSession::new(AgentProfile::new("bounded").with_max_iterations(2));
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;
        assert_eq!(outcome.status, DriveStatus::Completed);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.response.decision.reason, "task iteration bound reached");
        assert_eq!(outcome.response.decision.kind, Continuation::Terminate);
    }

    #[tokio::test]
    async fn unpermitted_tool_fails_without_another_completion() {
        let provider = Arc::new(ScriptedProvider::new([tool_reply(
            "echo",
            serde_json::json!({"text": "x"}),
            true,
        )]));
        let ctl = controller(provider.clone());
        let mut s = AgentSession::new(AgentProfile::new("locked").with_tools(["read_file"]));
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Tool));
        assert_eq!(provider.call_count(), 1);
        assert!(outcome.final_text().contains("refused"));
    }

    #[tokio::test]
    async fn empty_output_is_a_protocol_failure() {
        let provider = Arc::new(ScriptedProvider::new(["   "]));
        let ctl = controller(provider);
        let mut s = session();
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Protocol));
        assert!(!outcome.final_text().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_surfaced() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )));
        let ctl = controller(provider);
        let mut s = session();
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Provider));
    }

    #[tokio::test]
    async fn single_discipline_defers_extra_calls() {
        let two_calls = serde_json::json!({
            "analysis": "",
            "commentary": "two lookups",
            "final": "",
            "metadata": {
                "continue": false,
                "tool_calls": [
                    {"tool": "echo", "parameters": {"text": "first"}},
                    {"tool": "echo", "parameters": {"text": "second"}}
                ]
            }
        })
        .to_string();
        let provider = Arc::new(ScriptedProvider::new([
            two_calls,
            tool_reply("echo", serde_json::json!({"text": "second"}), false),
        ]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;

        assert_eq!(provider.call_count(), 2);
        assert_eq!(outcome.tool_results.len(), 2);
        let second = &provider.requests()[1];
        assert!(second.messages.iter().any(|m| m.content.contains("Only the first ran")));
        assert!(s.deferred().is_empty());
    }

    #[tokio::test]
    async fn batch_discipline_runs_every_call() {
        let two_calls = serde_json::json!({
            "final": "",
            "metadata": {
                "continue": false,
                "tool_calls": [
                    {"tool": "echo", "parameters": {"text": "a"}},
                    {"tool": "echo", "parameters": {"text": "b"}}
                ]
            }
        })
        .to_string();
        let provider = Arc::new(ScriptedProvider::new([two_calls]));
        let ctl = controller(provider.clone()).with_discipline(ToolDiscipline::Batch);
        let mut s = session();
        let outcome = ctl.submit(&mut s, "go", &registry(), &TurnContext::new()).await;
        assert_eq!(outcome.tool_results.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_completion() {
        let provider = Arc::new(ScriptedProvider::new(["never seen"]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let ctx = TurnContext::new();
        ctx.cancel.cancel();
        let outcome = ctl.submit(&mut s, "go", &registry(), &ctx).await;
        assert_eq!(outcome.status, DriveStatus::Cancelled);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_waits_for_the_in_flight_provider_call() {
        let provider = Arc::new(
            ScriptedProvider::new([final_reply("late answer", true)])
                .with_delay(std::time::Duration::from_secs(10)),
        );
        let ctl = controller(provider.clone());
        let mut s = session();
        let ctx = TurnContext::new();
        let cancel = ctx.cancel.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome = ctl.submit(&mut s, "go", &registry(), &ctx).await;
        canceller.await.unwrap();

        assert_eq!(outcome.status, DriveStatus::Cancelled);
        assert!(started.elapsed() >= std::time::Duration::from_secs(10));
        assert_eq!(provider.call_count(), 1);
        // The completed response is kept; only the next iteration is skipped.
        assert_eq!(s.history().len(), 2);
    }

    #[tokio::test]
    async fn events_are_streamed() {
        let provider = Arc::new(ScriptedProvider::new([
            tool_reply("echo", serde_json::json!({"text": "x"}), true),
            final_reply("done", false),
        ]));
        let ctl = controller(provider);
        let mut s = session();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = TurnContext::new().with_events(tx);
        ctl.submit(&mut s, "go", &registry(), &ctx).await;
        drop(ctx);

        let mut types = Vec::new();
        while let Some(event) = rx.recv().await {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec!["commentary", "tool_call", "tool_result", "continuation", "final", "continuation"]
        );
    }

    #[tokio::test]
    async fn run_turn_is_a_single_iteration() {
        let provider = Arc::new(ScriptedProvider::new([final_reply("step one", true)]));
        let ctl = controller(provider.clone());
        let mut s = session();
        let response = ctl
            .run_turn(&mut s, "go", &registry(), &TurnContext::new())
            .await
            .unwrap();
        assert_eq!(response.final_text, "step one");
        assert_eq!(s.state(), EngineState::Continue);
        assert_eq!(provider.call_count(), 1);
    }
}
