//! HTTP and WebSocket gateway for Swarmline.
//!
//! Exposes the runtime over a persistent WebSocket connection plus a small
//! REST surface for health, status, switching and mailbox inspection.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use swarmline_agent::AgentRuntime;
use swarmline_config::AppConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub runtime: AgentRuntime,
    pub config: AppConfig,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(runtime: AgentRuntime, config: AppConfig) -> Self {
        Self {
            runtime,
            config,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: `/health` plus the v1 API nested under `/v1`.
///
/// Layers applied:
/// - CORS limited to local origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            is_local_origin(origin.as_bytes())
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn is_local_origin(origin: &[u8]) -> bool {
    ["http://localhost", "http://127.0.0.1", "http://[::1]"]
        .iter()
        .any(|prefix| {
            origin.starts_with(prefix.as_bytes())
                && matches!(origin.get(prefix.len()), None | Some(b':') | Some(b'/'))
        })
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let providers = swarmline_providers::build_from_config(&config);
    let provider = providers
        .default()
        .ok_or("No default provider configured. Set an API key")?;
    let tools = Arc::new(swarmline_tools::registry_from_config(&config));
    let runtime = AgentRuntime::from_config(&config, provider, tools)?;

    let app = build_router(Arc::new(GatewayState::new(runtime, config)));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gateway shutting down");
        })
        .await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
