//! HTTP gateway for toolflow.
//!
//! Exposes the engine over REST:
//! - `POST /chat`        — run one request, return the final outcome
//! - `POST /chat/stream` — same loop, side effects streamed as SSE
//! - `GET  /tools`       — the aggregated tool catalog
//! - `GET  /health`      — process and backend status
//!
//! Built on Axum; handlers receive the process-lifetime
//! [`OrchestratorContext`] by injection, never through globals.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use toolflow_core::error::{Error, SessionError};
use toolflow_engine::{ChatRequest, EngineEvent, OrchestratorContext, run, run_stream};
use toolflow_registry::aggregate;

type SharedContext = Arc<OrchestratorContext>;

/// Build the gateway router.
pub fn build_router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/tools", get(tools_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind and serve until the process exits.
pub async fn serve(ctx: SharedContext) -> std::io::Result<()> {
    let addr = format!("{}:{}", ctx.config.gateway.host, ctx.config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, build_router(ctx)).await
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    intent: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,

    session_id: String,
    tools_used: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ToolsResponse {
    tools: Vec<ToolEntry>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ToolEntry {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: Vec<String>,
    custom_tools: usize,
    agents: usize,
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Session(SessionError::NoSessions) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(ctx): State<SharedContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    match run(&ctx, request).await {
        Ok(outcome) => Ok(Json(ChatResponse {
            response: outcome.response,
            intent: outcome.intent,
            data: outcome.data,
            tool_name: outcome.tool_name,
            session_id: outcome.session_id,
            tools_used: outcome.tools_used,
        })),
        Err(e) => {
            error!(error = %e, "chat request failed");
            Err((
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

async fn chat_stream_handler(
    State(ctx): State<SharedContext>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<EngineEvent>(64);

    tokio::spawn(async move {
        // A disconnected client drops the receiver; the loop still finishes
        // and its side effects (transcript, memory) are kept.
        if let Err(e) = run_stream(&ctx, request, tx.clone()).await {
            error!(error = %e, "streaming chat request failed");
            let _ = tx
                .send(EngineEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".into());
        Ok(SseEvent::default().data(data))
    });
    Sse::new(stream)
}

async fn tools_handler(State(ctx): State<SharedContext>) -> Json<ToolsResponse> {
    let agent = ctx.agent(None);
    let catalog = aggregate(&ctx.sessions, &agent, &ctx.config.custom_tools).await;
    let tools: Vec<ToolEntry> = catalog
        .descriptors()
        .iter()
        .map(|d| ToolEntry {
            name: d.name.clone(),
            description: d.description.clone(),
            input_schema: d.input_schema.clone(),
        })
        .collect();
    let count = tools.len();
    Json(ToolsResponse { tools, count })
}

async fn health_handler(State(ctx): State<SharedContext>) -> Json<HealthResponse> {
    let mut sessions: Vec<String> = ctx.sessions.keys().cloned().collect();
    sessions.sort();
    Json(HealthResponse {
        status: "ok",
        sessions,
        custom_tools: ctx.config.custom_tools.len(),
        agents: ctx.config.agents.len(),
    })
}
