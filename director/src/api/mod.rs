//! HTTP surface of the director.
//!
//! `/api/*` mirrors the backend's routes through the readiness-gated proxy.
//! `/session/*` is the local control surface the UI uses to drive rounds.

mod session;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde_json::json;
use shared_types::{
    Ack, ApiFailure, CreateScriptResponse, SendMessageRequest, SendMessageResponse,
    ASSISTANT_AUTHOR,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::proxy::{Forwarded, ProxyError, RouteId, RouteMethod, ROUTES};
use crate::AppState;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut api = Router::new();
    for route in ROUTES.iter() {
        let method_router = match route.id {
            RouteId::CreateScript => post(create_script),
            RouteId::SendMessage => post(send_message),
            RouteId::ClearHistory => post(clear_history),
            id => passthrough(id, route.method),
        };
        api = api.route(route.local_path, method_router);
    }

    api.route("/", get(root_info))
        .route("/session/start", post(session::start))
        .route("/session/stop", post(session::stop))
        .route("/session/human-turn", post(session::human_turn))
        .route("/session/state", get(session::state))
        .route("/session/log", get(session::log))
        .route("/session/backend", get(session::backend))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn passthrough(id: RouteId, method: RouteMethod) -> MethodRouter<Arc<AppState>> {
    let handler = move |State(state): State<Arc<AppState>>, body: Bytes| async move {
        relay(id, state.backend.forward(id, body).await)
    };
    match method {
        RouteMethod::Get => get(handler),
        RouteMethod::Post => post(handler),
    }
}

fn relay(id: RouteId, result: Result<Forwarded, ProxyError>) -> Response {
    match result {
        Ok(forwarded) => forwarded.into_response(),
        Err(e) => {
            warn!(route = id.route().local_path, error = %e, "proxied request failed");
            e.into_response()
        }
    }
}

/// POST /api/create-script
///
/// Relayed verbatim; a successful answer also seeds the session's
/// participants.
async fn create_script(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let result = state.backend.forward(RouteId::CreateScript, body).await;
    if let Ok(forwarded) = &result {
        match serde_json::from_slice::<CreateScriptResponse>(&forwarded.body) {
            Ok(CreateScriptResponse {
                success: true,
                data: Some(data),
                ..
            }) => state.conversation.record_script(&data.characters).await,
            Ok(_) => info!("script creation did not succeed"),
            Err(e) => error!(error = %e, "unreadable create-script response"),
        }
    }
    relay(RouteId::CreateScript, result)
}

/// POST /api/send-message
///
/// A free message outside any round. Relayed verbatim; when the backend
/// answered, both lines are mirrored into the conversation log.
async fn send_message(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = serde_json::from_slice::<SendMessageRequest>(&body).ok();
    let result = state.backend.forward(RouteId::SendMessage, body).await;
    if let (Some(request), Ok(forwarded)) = (request, &result) {
        match serde_json::from_slice::<SendMessageResponse>(&forwarded.body) {
            Ok(SendMessageResponse {
                success: true,
                response: Some(response),
                speaker,
                ..
            }) => {
                let speaker = speaker.unwrap_or_else(|| ASSISTANT_AUTHOR.to_string());
                state
                    .conversation
                    .record_exchange(&request.message, &speaker, &response)
                    .await;
            }
            Ok(_) => info!("free message was not answered"),
            Err(e) => error!(error = %e, "unreadable send-message response"),
        }
    }
    relay(RouteId::SendMessage, result)
}

/// POST /api/clear-history
///
/// Relayed verbatim. Only a confirmed clear stops the running session and
/// empties the local log and round counter.
async fn clear_history(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let result = state.backend.forward(RouteId::ClearHistory, body).await;
    if let Ok(forwarded) = &result {
        match serde_json::from_slice::<Ack>(&forwarded.body) {
            Ok(Ack { success: true, .. }) => state.conversation.mirror_clear().await,
            Ok(Ack { error, .. }) => warn!(?error, "backend refused to clear history"),
            Err(e) => error!(error = %e, "unreadable clear-history response"),
        }
    }
    relay(RouteId::ClearHistory, result)
}

/// GET /
async fn root_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "service": "director",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "port": state.port,
        "backendReady": state.backend.gate().is_ready(),
        "backendPort": state.supervisor.snapshot().await.port,
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiFailure::new("API endpoint not found")),
    )
}
