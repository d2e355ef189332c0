//! Forwarding layer between the UI and the script backend.
//!
//! Stateless apart from the readiness check: a closed gate short-circuits
//! every route with `BackendUnavailable` before any network call is made.

mod routes;

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use shared_types::{
    Ack, AiSpeakRequest, AiSpeakResponse, ApiFailure, NextSpeakerRequest, NextSpeakerResponse,
    UserSpeakRequest,
};
use tracing::{debug, error, warn};

use crate::conversation::TurnBackend;
use crate::readiness::ReadinessGate;

pub use routes::{ProxyRoute, RouteId, RouteMethod, ROUTES};

pub const BACKEND_UNAVAILABLE: &str = "backend unavailable";

#[derive(Debug, thiserror::Error, Clone)]
pub enum ProxyError {
    /// Gate closed, or the backend refused the connection.
    #[error("backend unavailable")]
    BackendUnavailable,
    /// The backend answered with a non-success status; relayed verbatim.
    #[error("backend rejected request ({status}): {}", rejection_message(.body))]
    BackendRejected { status: StatusCode, body: Bytes },
    /// Timeouts, resets, unreadable bodies and malformed responses.
    #[error("proxy request failed: {0}")]
    Transport(String),
}

/// Best-effort extraction of `error` from a backend failure body.
fn rejection_message(body: &Bytes) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(ToString::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::BackendUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiFailure::new(BACKEND_UNAVAILABLE)),
            )
                .into_response(),
            ProxyError::BackendRejected { status, body } => Forwarded { status, body }.into_response(),
            ProxyError::Transport(_) => (
                StatusCode::BAD_GATEWAY,
                Json(ApiFailure::new(self.to_string())),
            )
                .into_response(),
        }
    }
}

/// A successful backend answer, relayed as-is.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub status: StatusCode,
    pub body: Bytes,
}

impl IntoResponse for Forwarded {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    gate: ReadinessGate,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, gate: ReadinessGate, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            gate,
            timeout,
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Forward `body` to the backend path mapped to `id`.
    pub async fn forward(&self, id: RouteId, body: Bytes) -> Result<Forwarded, ProxyError> {
        let route = id.route();
        if !self.gate.is_ready() {
            debug!(route = route.local_path, "gate closed, refusing to forward");
            return Err(ProxyError::BackendUnavailable);
        }

        let url = format!("{}{}", self.base_url, route.backend_path);
        debug!(method = ?route.method, %url, "proxying request to backend");

        let request = match route.method {
            RouteMethod::Get => self.client.get(&url),
            RouteMethod::Post => {
                let body = if body.is_empty() {
                    Bytes::from_static(b"{}")
                } else {
                    body
                };
                self.client
                    .post(&url)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body)
            }
        };

        let res = match request.timeout(self.timeout).send().await {
            Ok(res) => res,
            Err(e) if e.is_connect() => {
                warn!(%url, error = %e, "backend refused connection");
                // Close the gate; the periodic probe reopens it.
                self.gate.mark_unready(format!("connection refused: {e}"));
                return Err(ProxyError::BackendUnavailable);
            }
            Err(e) => {
                error!(%url, error = %e, "backend request failed");
                return Err(ProxyError::Transport(e.to_string()));
            }
        };

        let status = res.status();
        let body = res.bytes().await.map_err(|e| {
            error!(%url, error = %e, "failed to read backend response body");
            ProxyError::Transport(format!("invalid backend response: {e}"))
        })?;

        if status.is_success() {
            Ok(Forwarded { status, body })
        } else {
            warn!(%url, %status, "backend returned an error");
            Err(ProxyError::BackendRejected { status, body })
        }
    }

    /// Forward a typed request and decode the typed answer.
    pub async fn call<Req, Res>(&self, id: RouteId, request: &Req) -> Result<Res, ProxyError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| ProxyError::Transport(format!("failed to encode request: {e}")))?;
        let forwarded = self.forward(id, Bytes::from(body)).await?;
        serde_json::from_slice(&forwarded.body)
            .map_err(|e| ProxyError::Transport(format!("malformed backend response: {e}")))
    }
}

#[async_trait]
impl TurnBackend for BackendClient {
    async fn next_speaker(&self, request: NextSpeakerRequest) -> Result<NextSpeakerResponse, ProxyError> {
        self.call(RouteId::NextSpeaker, &request).await
    }

    async fn user_speak(&self, request: UserSpeakRequest) -> Result<Ack, ProxyError> {
        self.call(RouteId::UserSpeak, &request).await
    }

    async fn ai_speak(&self, request: AiSpeakRequest) -> Result<AiSpeakResponse, ProxyError> {
        self.call(RouteId::AiSpeak, &request).await
    }
}
