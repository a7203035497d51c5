//! HTTP surface over the shared [`Agent`].

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::agent::{Agent, AgentError, Exchange};

/// Body of `GET /`.
pub const STATUS_MESSAGE: &str = "Agent backend running";

// ============================================================================
// State & Wire Types
// ============================================================================

/// Shared by every request; one turn runs at a time.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Mutex<Agent>>,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(Mutex::new(agent)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: String,
}

/// Agent failure rendered as `500 {"error": ...}`.
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": STATUS_MESSAGE }))
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let mut agent = state.agent.lock().await;
    let response = agent.handle(&request.query).await?;
    Ok(Json(AskResponse { response }))
}

async fn history(State(state): State<AppState>) -> Json<Vec<Exchange>> {
    let agent = state.agent.lock().await;
    Json(agent.history().to_vec())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/ask", post(ask))
        .route("/history", get(history))
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process is stopped.
pub async fn serve(agent: Agent, port: u16) -> std::io::Result<()> {
    let app = router(AppState::new(agent));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("askdb listening on {addr}");

    axum::serve(listener, app).await
}

// ============================================================================
// Tests
// ============================================================================
