//! HTTP API.
//!
//! - POST streaming task endpoints (SSE relay, see [`Task::STREAMING`])
//! - POST buffered task endpoints (JSON, see [`Task::BUFFERED`])
//! - GET /stop?sessionID=<id>
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::server::metrics::{RelayMetrics, UpstreamPhase};
use crate::server::streaming::{relay, relay_to_sse_stream};
use crate::server::tasks::Task;
use crate::session::{SessionId, SessionRegistry, SharedRegistry};
use crate::upstream::CompletionClient;

/// Application state shared across handlers.
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    pub sessions: SharedRegistry,
    pub config: Arc<Config>,
    pub metrics: Arc<RelayMetrics>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        config: Arc<Config>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            client,
            sessions: SessionRegistry::shared(),
            config,
            metrics: Arc::new(RelayMetrics::new()?),
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    let max_body = state.config.server.max_body_bytes;

    let mut router = Router::new();
    for task in Task::STREAMING {
        router = router.route(task.path(), streaming_route(task));
    }
    for task in Task::BUFFERED {
        router = router.route(task.path(), buffered_route(task));
    }

    router
        .route("/stop", get(stop_session))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn streaming_route(task: Task) -> MethodRouter<Arc<AppState>> {
    post(move |State(state): State<Arc<AppState>>, body: String| async move {
        stream_task(state, task, body).await
    })
    .options(preflight)
}

fn buffered_route(task: Task) -> MethodRouter<Arc<AppState>> {
    post(move |State(state): State<Arc<AppState>>, body: String| async move {
        complete_task(state, task, body).await
    })
    .options(preflight)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StopParams {
    #[serde(rename = "sessionID")]
    pub session_id: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Reject payloads the task will not forward upstream.
fn validate(state: &AppState, task: Task, body: &str) -> Result<(), ApiError> {
    let limit = task.max_bytes(&state.config.limits);
    let result = if body.len() > limit {
        Err(ApiError::PayloadTooLarge {
            size: body.len(),
            limit,
        })
    } else if body.trim().is_empty() {
        Err(ApiError::EmptyPayload)
    } else {
        Ok(())
    };

    if result.is_err() {
        state.metrics.request_rejected();
    }
    result
}

async fn stream_task(state: Arc<AppState>, task: Task, body: String) -> Result<Response, ApiError> {
    validate(&state, task, &body)?;

    info!(task = %task, bytes = body.len(), "Streaming request");

    let request = task.request(&body, &state.config.upstream);
    let chunks = match state.client.stream(request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            state.metrics.upstream_error(UpstreamPhase::Setup);
            return Err(e.into());
        }
    };

    let session = state.sessions.open();
    info!(task = %task, session_id = %session.id(), "Session opened");

    let events = relay(session, chunks, state.metrics.clone());
    let keep_alive = KeepAlive::new().interval(state.config.server.keep_alive());

    Ok(Sse::new(relay_to_sse_stream(events))
        .keep_alive(keep_alive)
        .into_response())
}

async fn complete_task(
    state: Arc<AppState>,
    task: Task,
    body: String,
) -> Result<Response, ApiError> {
    validate(&state, task, &body)?;

    info!(task = %task, bytes = body.len(), "Buffered request");

    let request = task.request(&body, &state.config.upstream);
    let content = match state.client.complete(request).await {
        Ok(content) => content,
        Err(e) => {
            state.metrics.upstream_error(UpstreamPhase::Buffered);
            return Err(e.into());
        }
    };

    Ok(([(CONTENT_TYPE, "application/json")], content).into_response())
}

async fn stop_session(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StopParams>,
) -> Result<String, ApiError> {
    let raw = params
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ApiError::MissingSessionId)?;

    let found = match raw.parse::<SessionId>() {
        Ok(id) => state.sessions.cancel(&id),
        Err(_) => false,
    };
    state.metrics.cancel_requested(found);

    if found {
        info!(session_id = %raw, "Stop requested");
        Ok(format!("Stopped session {raw}\n"))
    } else {
        warn!(session_id = %raw, "Stop requested for unknown session");
        Ok(format!("Session {raw} not found\n"))
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.sessions.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render(state.sessions.len()) {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
