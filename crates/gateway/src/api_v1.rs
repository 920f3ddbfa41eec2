//! HTTP API v1 — the runtime over REST and WebSocket.
//!
//! Endpoints:
//!
//! - `GET  /v1/ws`              — WebSocket for bidirectional streaming
//! - `POST /v1/message`         — Submit input to the active agent, wait for the drive
//! - `GET  /v1/agents`          — List the agent population
//! - `GET  /v1/status`          — Active agent, switch depth, last decisions
//! - `POST /v1/switch`          — Hand control to another agent
//! - `GET  /v1/mailbox/{agent}` — Every message in an agent's inbox

use axum::{
    Router,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use swarmline_agent::{DriveStatus, RuntimeEvent, RuntimeStatus, TurnContext};
use swarmline_core::{ContinuationDecision, Error};
use swarmline_mailbox::Mail;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/message", post(message_handler))
        .route("/agents", get(list_agents_handler))
        .route("/status", get(status_handler))
        .route("/switch", post(switch_handler))
        .route("/mailbox/{agent}", get(mailbox_handler))
        .with_state(state)
}

// ── Request/Response types ────────────────────────────────────────────────

#[derive(Deserialize)]
struct MessageRequest {
    content: String,
    /// Include commentary and tool traffic in `events`
    #[serde(default)]
    verbose: bool,
    /// Use the detailed line budget for `final`
    #[serde(default)]
    detail: bool,
}

#[derive(Serialize)]
struct MessageResponse {
    agent: String,
    #[serde(rename = "final")]
    final_text: String,
    status: DriveStatus,
    iterations: u32,
    decision: ContinuationDecision,
    events: Vec<RuntimeEvent>,
}

#[derive(Serialize)]
struct AgentDto {
    name: String,
    role: String,
    description: String,
    tools: Vec<String>,
    active: bool,
}

#[derive(Serialize)]
struct AgentListResponse {
    active: String,
    agents: Vec<AgentDto>,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    runtime: RuntimeStatus,
    model: String,
    uptime_secs: i64,
}

#[derive(Deserialize)]
struct SwitchRequest {
    agent: String,
    #[serde(default = "default_switch_reason")]
    reason: String,
    /// Context carried to the new agent. Defaults to a recap of the old one.
    #[serde(default)]
    summary: Option<String>,
}

fn default_switch_reason() -> String {
    "requested by client".into()
}

#[derive(Serialize)]
struct SwitchResponse {
    from: String,
    to: String,
    reason: String,
}

#[derive(Serialize)]
struct MailboxResponse {
    agent: String,
    unread: usize,
    mail: Vec<Mail>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn runtime_error(err: Error) -> ApiError {
    let status = match &err {
        Error::UnknownAgent(_) => StatusCode::NOT_FOUND,
        Error::Mailbox(_) => StatusCode::CONFLICT,
        Error::Config { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Whether an event reaches a client with the given verbosity.
fn forwards(event: &RuntimeEvent, verbose: bool) -> bool {
    verbose || !event.is_verbose_only()
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn message_handler(
    State(state): State<SharedState>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "content must not be empty"));
    }
    info!(verbose = payload.verbose, detail = payload.detail, "v1/message request");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ctx = TurnContext::new().with_events(tx).detailed(payload.detail);
    let outcome = state
        .runtime
        .submit(&payload.content, ctx)
        .await
        .map_err(runtime_error)?;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if forwards(&event, payload.verbose) {
            events.push(event);
        }
    }

    Ok(Json(MessageResponse {
        final_text: outcome.final_text().to_string(),
        agent: outcome.agent,
        status: outcome.status,
        iterations: outcome.iterations,
        decision: outcome.response.decision,
        events,
    }))
}

async fn list_agents_handler(State(state): State<SharedState>) -> Json<AgentListResponse> {
    let active = state.runtime.active_agent();
    let agents = state
        .runtime
        .agents()
        .iter()
        .map(|profile| AgentDto {
            name: profile.name.clone(),
            role: profile.role.clone(),
            description: profile.description.clone(),
            tools: profile.tools.clone(),
            active: profile.name == active,
        })
        .collect();
    Json(AgentListResponse { active, agents })
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        runtime: state.runtime.status(),
        model: state.config.default_model.clone(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}

async fn switch_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SwitchRequest>,
) -> Result<Json<SwitchResponse>, ApiError> {
    let record = state
        .runtime
        .switch_to(&payload.agent, &payload.reason, payload.summary)
        .await
        .map_err(runtime_error)?;
    Ok(Json(SwitchResponse {
        from: record.from,
        to: record.to,
        reason: record.reason,
    }))
}

async fn mailbox_handler(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
) -> Result<Json<MailboxResponse>, ApiError> {
    let mailbox = state.runtime.mailbox();
    if !mailbox.is_registered(&agent) {
        return Err(api_error(StatusCode::NOT_FOUND, format!("Unknown agent: {agent}")));
    }
    Ok(Json(MailboxResponse {
        unread: mailbox.unread_count(&agent),
        mail: mailbox.all_mail(&agent),
        agent,
    }))
}

// ── WebSocket ─────────────────────────────────────────────────────────────

/// `GET /v1/ws` — Full bidirectional WebSocket connection.
///
/// Protocol:
/// - Client → Server: `{ "type": "message", "content": "...", "verbose": bool, "detail": bool }`
///   or `{ "type": "cancel" }`
/// - Server → Client: `RuntimeEvent` JSON frames (final, continuation, switched, done, error;
///   commentary and tool traffic only for verbose turns)
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// WebSocket frame from the client.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Message {
        content: String,
        #[serde(default)]
        verbose: bool,
        #[serde(default)]
        detail: bool,
    },
    /// Cancel the turn started by the latest `message`
    Cancel,
}

async fn handle_ws_connection(socket: WebSocket, state: SharedState) {
    info!("WebSocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
    tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                break; // client disconnected
            }
        }
    });

    let connection = CancellationToken::new();
    let mut current: Option<CancellationToken> = None;

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = out_tx.send(RuntimeEvent::Error {
                    agent: state.runtime.active_agent(),
                    kind: None,
                    message: format!("Invalid frame: {e}"),
                });
                continue;
            }
        };

        match frame {
            ClientFrame::Message {
                content,
                verbose,
                detail,
            } => {
                let cancel = connection.child_token();
                current = Some(cancel.clone());
                spawn_turn(state.clone(), content, verbose, detail, cancel, out_tx.clone());
            }
            ClientFrame::Cancel => match current.take() {
                Some(cancel) => cancel.cancel(),
                None => warn!("Cancel received with no turn in flight"),
            },
        }
    }

    connection.cancel();
    info!("WebSocket connection closed");
}

/// Run one submission in the background, forwarding its events to `out`.
fn spawn_turn(
    state: SharedState,
    content: String,
    verbose: bool,
    detail: bool,
    cancel: CancellationToken,
    out: mpsc::UnboundedSender<RuntimeEvent>,
) {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward_to = out.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if forwards(&event, verbose) && forward_to.send(event).is_err() {
                    break;
                }
            }
        });

        let ctx = TurnContext::new()
            .with_events(tx)
            .with_cancel(cancel)
            .detailed(detail);
        let result = state.runtime.submit(&content, ctx).await;
        let _ = forwarder.await;

        if let Err(e) = result {
            let _ = out.send(RuntimeEvent::Error {
                agent: state.runtime.active_agent(),
                kind: e.kind(),
                message: e.to_string(),
            });
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::GatewayState;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use swarmline_agent::AgentRuntime;
    use swarmline_config::AppConfig;
    use swarmline_core::error::ProviderError;
    use swarmline_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use swarmline_core::{AgentProfile, ToolRegistry};
    use swarmline_mailbox::{DeliveryMode, MailBody, NewMail};
    use tower::ServiceExt;

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        final_text: String,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let content = serde_json::json!({
                "commentary": "thinking it over",
                "final": self.final_text,
                "metadata": {"continue": false, "reason": "answered"}
            });
            Ok(ProviderResponse {
                content: content.to_string(),
                usage: None,
                model: request.model,
            })
        }
    }

    pub(crate) fn test_state(final_text: &str) -> SharedState {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider {
            final_text: final_text.to_string(),
        });
        let runtime = AgentRuntime::builder(provider)
            .tools(Arc::new(ToolRegistry::new()))
            .agent(AgentProfile::new("alice").with_role("planner"))
            .agent(AgentProfile::new("bob").with_role("reviewer"))
            .build()
            .unwrap();
        Arc::new(GatewayState::new(runtime, AppConfig::default()))
    }

    fn app(state: &SharedState) -> Router {
        crate::build_router(state.clone())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn agents_lists_population() {
        let state = test_state("hi");
        let response = app(&state).oneshot(get("/v1/agents")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["active"], "alice");
        assert_eq!(json["agents"].as_array().unwrap().len(), 2);
        assert_eq!(json["agents"][1]["role"], "reviewer");
        assert_eq!(json["agents"][1]["active"], false);
    }

    #[tokio::test]
    async fn message_returns_final_and_decision() {
        let state = test_state("Hello there");
        let response = app(&state)
            .oneshot(post_json("/v1/message", serde_json::json!({"content": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["agent"], "alice");
        assert_eq!(json["final"], "Hello there");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["decision"]["kind"], "TERMINATE");
        assert_eq!(json["decision"]["reason"], "answered");

        let types: Vec<&str> = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["final", "continuation", "done"]);
    }

    #[tokio::test]
    async fn verbose_message_includes_commentary() {
        let state = test_state("Hello");
        let response = app(&state)
            .oneshot(post_json(
                "/v1/message",
                serde_json::json!({"content": "hi", "verbose": true}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["events"][0]["type"], "commentary");
        assert_eq!(json["events"][0]["content"], "thinking it over");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let state = test_state("x");
        let response = app(&state)
            .oneshot(post_json("/v1/message", serde_json::json!({"content": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_reports_last_decision() {
        let state = test_state("done");
        app(&state)
            .oneshot(post_json("/v1/message", serde_json::json!({"content": "go"})))
            .await
            .unwrap();

        let response = app(&state).oneshot(get("/v1/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["active"], "alice");
        assert_eq!(json["pending_requests"], 0);
        assert_eq!(json["agents"][0]["last_decision"]["reason"], "answered");
        assert_eq!(json["agents"][0]["state"], "TERMINATE");
    }

    #[tokio::test]
    async fn switch_moves_active_agent() {
        let state = test_state("x");
        let response = app(&state)
            .oneshot(post_json(
                "/v1/switch",
                serde_json::json!({"agent": "bob", "reason": "review"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["from"], "alice");
        assert_eq!(json["to"], "bob");
        assert_eq!(state.runtime.active_agent(), "bob");

        let again = app(&state)
            .oneshot(post_json("/v1/switch", serde_json::json!({"agent": "bob"})))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn switch_to_unknown_agent_is_not_found() {
        let state = test_state("x");
        let response = app(&state)
            .oneshot(post_json("/v1/switch", serde_json::json!({"agent": "zed"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mailbox_lists_inbox() {
        let state = test_state("x");
        state
            .runtime
            .mailbox()
            .send(
                NewMail::new("alice", "bob", "plan", MailBody::new("Please review")),
                DeliveryMode::FireAndForget,
            )
            .unwrap();

        let response = app(&state).oneshot(get("/v1/mailbox/bob")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["unread"], 1);
        assert_eq!(json["mail"][0]["body"]["content"], "Please review");

        let missing = app(&state).oneshot(get("/v1/mailbox/zed")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn client_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"message","content":"hi","verbose":true}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Message {
                content: "hi".into(),
                verbose: true,
                detail: false,
            }
        );
        let cancel: ClientFrame = serde_json::from_str(r#"{"type":"cancel"}"#).unwrap();
        assert_eq!(cancel, ClientFrame::Cancel);
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn quiet_clients_skip_commentary() {
        let commentary = RuntimeEvent::Commentary {
            agent: "a".into(),
            content: "calling list_directory".into(),
        };
        let final_event = RuntimeEvent::Final {
            agent: "a".into(),
            content: "done".into(),
        };
        assert!(!forwards(&commentary, false));
        assert!(forwards(&commentary, true));
        assert!(forwards(&final_event, false));
    }
}
