use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared_types::{ApiFailure, HumanTurnRequest, StartSessionRequest};

use crate::conversation::{HumanTurnError, SessionError};
use crate::AppState;

/// POST /session/start
///
/// The body is optional; `{}` or no body runs the default number of rounds.
pub async fn start(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        StartSessionRequest::default()
    } else {
        match serde_json::from_slice::<StartSessionRequest>(&body) {
            Ok(req) => req,
            Err(e) => return invalid_body(e),
        }
    };

    match state.conversation.start(request.rounds).await {
        Ok(started) => Json(json!({
            "success": true,
            "sessionId": started.session_id.to_string(),
            "rounds": started.rounds,
        }))
        .into_response(),
        Err(e @ (SessionError::ScriptMissing | SessionError::AlreadyActive)) => {
            (StatusCode::CONFLICT, Json(ApiFailure::new(e.to_string()))).into_response()
        }
    }
}

/// POST /session/stop
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopped = state.conversation.stop().await;
    Json(json!({ "success": true, "stopped": stopped }))
}

/// POST /session/human-turn
pub async fn human_turn(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req = match serde_json::from_slice::<HumanTurnRequest>(&body) {
        Ok(req) => req,
        Err(e) => return invalid_body(e),
    };
    match state.conversation.resolve_human(req.action, req.message) {
        Ok(round) => Json(json!({ "success": true, "round": round })).into_response(),
        Err(e @ HumanTurnError::EmptyMessage) => {
            (StatusCode::BAD_REQUEST, Json(ApiFailure::new(e.to_string()))).into_response()
        }
        Err(e @ HumanTurnError::NoPendingTurn) => {
            (StatusCode::CONFLICT, Json(ApiFailure::new(e.to_string()))).into_response()
        }
    }
}

/// GET /session/state
pub async fn state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.conversation.snapshot().await;
    Json(json!({ "success": true, "session": snapshot }))
}

/// GET /session/log
pub async fn log(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let turns = state.conversation.log().snapshot().await;
    Json(json!({ "success": true, "count": turns.len(), "turns": turns }))
}

/// GET /session/backend
pub async fn backend(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.supervisor.snapshot().await;
    Json(json!({ "success": true, "backend": snapshot }))
}

fn invalid_body(e: serde_json::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiFailure::new(format!("invalid request body: {e}"))),
    )
        .into_response()
}
