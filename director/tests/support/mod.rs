//! Shared harness: an in-process stand-in for the script backend plus a
//! director router wired to it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use director::config::{BackendLaunch, ProbeTiming, SchedulerTiming};
use director::conversation::Conversation;
use director::proxy::BackendClient;
use director::readiness::ReadinessGate;
use director::supervisor::BackendSupervisor;
use director::{api, AppState};

#[derive(Clone, Default)]
pub struct StubState {
    pub hits: Arc<AtomicUsize>,
    /// Answers to next-speaker calls; `None` answers with a 500.
    pub speakers: Arc<Mutex<VecDeque<Option<Value>>>>,
    pub user_speaks: Arc<Mutex<Vec<Value>>>,
    pub system_info_delay_ms: Arc<AtomicU64>,
    pub refuse_clear: Arc<AtomicBool>,
}

pub struct StubBackend {
    pub base_url: String,
    pub port: u16,
    pub state: StubState,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl StubBackend {
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn push_human(&self) {
        self.push_speaker(Some(json!({
            "success": true,
            "next_speaker": "me",
            "speaker_type": "user",
            "action": "ask_user",
        })));
    }

    pub fn push_ai(&self, name: &str) {
        self.push_speaker(Some(json!({
            "success": true,
            "next_speaker": name,
            "speaker_type": "ai",
            "action": "ai_speak",
        })));
    }

    pub fn push_failure(&self) {
        self.push_speaker(None);
    }

    fn push_speaker(&self, answer: Option<Value>) {
        self.state.speakers.lock().unwrap().push_back(answer);
    }
}

async fn count_hits(State(state): State<StubState>, req: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    next.run(req).await
}

async fn create_script(Json(body): Json<Value>) -> Response {
    let scene = body["sceneDescription"].as_str().unwrap_or_default().trim().to_string();
    if scene.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "scene description must not be empty" })),
        )
            .into_response();
    }
    Json(json!({
        "success": true,
        "message": "script created",
        "data": { "scene": scene, "characters": ["Hero", "Villain"] },
    }))
    .into_response()
}

async fn send_message(Json(body): Json<Value>) -> Response {
    let message = body["message"].as_str().unwrap_or_default().trim().to_string();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "message must not be empty" })),
        )
            .into_response();
    }
    Json(json!({
        "success": true,
        "response": format!("Hero answers: {message}"),
        "speaker": "Hero",
        "round": body["round"],
    }))
    .into_response()
}

async fn clear_history(State(state): State<StubState>) -> Json<Value> {
    if state.refuse_clear.load(Ordering::SeqCst) {
        Json(json!({ "success": false, "error": "history is locked" }))
    } else {
        Json(json!({ "success": true, "message": "history cleared" }))
    }
}

async fn next_speaker(State(state): State<StubState>) -> Response {
    match state.speakers.lock().unwrap().pop_front().flatten() {
        Some(answer) => Json(answer).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": "could not decide the next speaker" })),
        )
            .into_response(),
    }
}

async fn user_speak(State(state): State<StubState>, Json(body): Json<Value>) -> Json<Value> {
    let action = body["action"].clone();
    state.user_speaks.lock().unwrap().push(body);
    Json(json!({ "success": true, "action": action }))
}

async fn ai_speak(Json(body): Json<Value>) -> Json<Value> {
    let speaker = body["speaker"].as_str().unwrap_or_default().to_string();
    let round = body["round"].as_u64().unwrap_or_default();
    Json(json!({
        "success": true,
        "speaker": speaker,
        "message": format!("{speaker} speaks in round {round}"),
        "round": round,
    }))
}

async fn system_info(State(state): State<StubState>) -> Json<Value> {
    let delay = state.system_info_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Json(json!({ "success": true, "bridge_status": "running" }))
}

pub async fn spawn_stub_backend() -> StubBackend {
    let state = StubState::default();
    let app = Router::new()
        .route(
            "/api/status",
            get(|| async { Json(json!({ "success": true, "status": "running" })) }),
        )
        .route("/api/create-script", post(create_script))
        .route("/api/send-message", post(send_message))
        .route(
            "/api/start-conversation",
            post(|| async { Json(json!({ "success": true })) }),
        )
        .route("/api/clear-history", post(clear_history))
        .route(
            "/api/get-history",
            get(|| async { Json(json!({ "success": true, "history": [], "count": 0 })) }),
        )
        .route("/api/system-info", get(system_info))
        .route("/api/next-speaker", post(next_speaker))
        .route("/api/user-speak", post(user_speak))
        .route("/api/ai-speak", post(ai_speak))
        .layer(middleware::from_fn_with_state(state.clone(), count_hits))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });

    StubBackend {
        base_url: format!("http://{addr}"),
        port: addr.port(),
        state,
        _shutdown: shutdown_tx,
    }
}

pub struct Harness {
    pub app: Router,
    pub gate: ReadinessGate,
    pub state: Arc<AppState>,
}

pub fn fast_scheduler() -> SchedulerTiming {
    SchedulerTiming {
        human_turn_timeout: Duration::from_secs(60),
        round_pause: Duration::from_millis(10),
        default_rounds: 5,
    }
}

/// Director wired to `base_url`, with the gate still closed.
pub fn harness(base_url: &str, port: u16, forward_timeout: Duration) -> Harness {
    let gate = ReadinessGate::new(base_url, Duration::from_secs(2));
    let backend = BackendClient::new(base_url, gate.clone(), forward_timeout);
    let launch = BackendLaunch {
        program: "python".to_string(),
        args: Vec::new(),
        workdir: std::env::temp_dir(),
        port,
        port_env: "FLASK_PORT".to_string(),
        sentinels: Vec::new(),
    };
    let supervisor = BackendSupervisor::new(launch, ProbeTiming::default(), gate.clone());
    let conversation = Conversation::new(Arc::new(backend.clone()), fast_scheduler());
    let state = Arc::new(AppState {
        port: 8899,
        backend,
        supervisor,
        conversation,
    });
    Harness {
        app: api::router(Arc::clone(&state)),
        gate,
        state,
    }
}

pub async fn json_response(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value: Value = serde_json::from_slice(&body).expect("Invalid JSON response");
    (status, value)
}

pub fn get_req(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll `GET /session/state` until `done` holds.
pub async fn wait_for_session<F>(app: &Router, mut done: F) -> Value
where
    F: FnMut(&Value) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (_, body) = json_response(app, get_req("/session/state")).await;
            if done(&body["session"]) {
                return body["session"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session never reached the expected state")
}
