//! HTTP route handlers for the tool API.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use turngate::core::types::{Invocation, Outcome, SessionSnapshot};
use turngate::scenario::ToolSpec;

use crate::sessions::{self, RegistryError};
use crate::sse;
use crate::state::{AppState, EngineEvent};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(end_session))
        .route("/sessions/{id}/invoke", post(invoke_session))
        .route("/events", get(sse::events_handler))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    scenario: String,
    sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        scenario: state.engine.controller().scenario().name.clone(),
        sessions: state.sessions.len().await,
    })
}

/// GET /api/tools - the tool catalogue for a function-calling layer.
async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolSpec>> {
    Json(state.engine.controller().scenario().tools())
}

#[derive(Debug, Default, Deserialize)]
struct CreateSession {
    #[serde(default)]
    id: Option<String>,
}

/// POST /api/sessions - start a conversation.
async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSession>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), StatusCode> {
    let Json(request) = body.unwrap_or_default();
    let slot = match state.sessions.create(&state.engine, request.id).await {
        Ok(slot) => slot,
        Err(RegistryError::Duplicate(id)) => {
            warn!(session = %id, "session id already in use");
            return Err(StatusCode::CONFLICT);
        }
    };
    let snapshot = slot.snapshot(&state.engine).await;
    state.publish(EngineEvent::SessionStarted {
        session_id: snapshot.id.clone(),
    });
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/sessions/{id} - current session snapshot.
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    let slot = state.sessions.get(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(slot.snapshot(&state.engine).await))
}

/// DELETE /api/sessions/{id} - end a conversation.
async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state.sessions.remove(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    info!(session = %id, "session ended");
    state.publish(EngineEvent::SessionEnded { session_id: id });
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{id}/invoke - run one tool call. A terminal outcome
/// releases the session.
async fn invoke_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(invocation): Json<Invocation>,
) -> Result<Json<Outcome>, StatusCode> {
    let slot = state.sessions.get(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    let outcome = sessions::invoke(Arc::clone(&state.engine), slot, invocation)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    state.publish(EngineEvent::invoked(&outcome));
    if outcome.terminal && state.sessions.remove(&id).await.is_some() {
        info!(session = %id, "terminal outcome, session released");
        state.publish(EngineEvent::SessionEnded { session_id: id });
    }
    Ok(Json(outcome))
}
