//! Readiness gate: the shared "can the backend serve requests" signal.
//!
//! The supervisor writes it, the proxy reads it. Values are published through
//! a `tokio::sync::watch` channel, so a reader always sees a whole
//! `ReadinessState` and never a half-updated one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadinessState {
    pub ready: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    state: watch::Sender<ReadinessState>,
    client: reqwest::Client,
    status_url: String,
    timeout: Duration,
}

impl ReadinessGate {
    /// `base_url` is the backend root, e.g. `http://127.0.0.1:8900`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let (state, _) = watch::channel(ReadinessState::default());
        Self {
            inner: Arc::new(GateInner {
                state,
                client: reqwest::Client::new(),
                status_url: format!("{}/api/status", base_url.trim_end_matches('/')),
                timeout,
            }),
        }
    }

    /// Non-blocking read of the current verdict.
    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready
    }

    pub fn snapshot(&self) -> ReadinessState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that wakes on every verdict change.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.inner.state.subscribe()
    }

    /// Issue one bounded health call against `/api/status`.
    ///
    /// Never fails: the outcome is recorded on the gate and returned.
    pub async fn probe(&self) -> bool {
        let outcome = self
            .inner
            .client
            .get(&self.inner.status_url)
            .timeout(self.inner.timeout)
            .send()
            .await;

        match outcome {
            Ok(res) if res.status() == reqwest::StatusCode::OK => {
                self.mark_ready();
                true
            }
            Ok(res) => {
                self.mark_unready(format!("status endpoint returned {}", res.status()));
                false
            }
            Err(e) if e.is_timeout() => {
                self.mark_unready(format!("health probe timed out after {:?}", self.inner.timeout));
                false
            }
            Err(e) if e.is_connect() => {
                self.mark_unready(format!("connection refused: {e}"));
                false
            }
            Err(e) => {
                self.mark_unready(format!("health probe failed: {e}"));
                false
            }
        }
    }

    pub fn mark_ready(&self) {
        let was_ready = self.inner.state.send_replace(ReadinessState {
            ready: true,
            last_checked_at: Some(Utc::now()),
            last_error: None,
        });
        if !was_ready.ready {
            info!(url = %self.inner.status_url, "backend is ready");
        }
    }

    pub fn mark_unready(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%reason, "backend not ready");
        self.inner.state.send_replace(ReadinessState {
            ready: false,
            last_checked_at: Some(Utc::now()),
            last_error: Some(reason),
        });
    }
}
