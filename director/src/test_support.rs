//! In-process stand-ins for the script backend used by unit tests.

use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tokio::net::TcpListener;

pub struct StatusStub {
    pub base_url: String,
    pub hits: Arc<AtomicUsize>,
    status: Arc<AtomicU16>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl StatusStub {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
    status: Arc<AtomicU16>,
}

async fn status_handler(State(state): State<StubState>) -> (StatusCode, Json<serde_json::Value>) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let code = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        code,
        Json(serde_json::json!({ "success": code.is_success(), "status": "running" })),
    )
}

/// Serve `GET /api/status` answering with `status` until dropped.
pub async fn spawn_status_stub(status: u16) -> StatusStub {
    let hits = Arc::new(AtomicUsize::new(0));
    let status = Arc::new(AtomicU16::new(status));
    let app = Router::new()
        .route("/api/status", get(status_handler))
        .with_state(StubState {
            hits: Arc::clone(&hits),
            status: Arc::clone(&status),
        });
    let (base_url, shutdown) = spawn_http_server(app).await;
    StatusStub {
        base_url,
        hits,
        status,
        _shutdown: shutdown,
    }
}

pub async fn spawn_http_server(app: Router) -> (String, tokio::sync::oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    (format!("http://{addr}"), shutdown_tx)
}

/// A loopback port nothing is listening on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
