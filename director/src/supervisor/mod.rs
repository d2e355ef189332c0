//! Backend supervisor: owns the lifecycle of the script backend process.

mod output;

use std::{process::Stdio, sync::Arc};

use chrono::{DateTime, Utc};
use shared_types::BackendSnapshot;
use tokio::{
    process::{Child, Command},
    sync::Mutex,
    task::{JoinHandle, JoinSet},
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{BackendLaunch, ProbeTiming};
use crate::readiness::ReadinessGate;

pub use output::{contains_sentinel, OutputStream};

/// What `start()` ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A backend was already answering on the port; nothing was spawned.
    Adopted,
    /// The process we spawned earlier is still alive.
    AlreadyRunning { pid: Option<u32> },
    Spawned { pid: Option<u32> },
    /// The process could not be started. Readiness stays false.
    SpawnFailed(String),
}

/// The spawned process as seen from outside.
#[derive(Debug, Clone)]
pub struct BackendProcess {
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub restart_count: u32,
}

pub struct BackendSupervisor {
    launch: BackendLaunch,
    timing: ProbeTiming,
    gate: ReadinessGate,
    inner: Mutex<SupervisorInner>,
}

#[derive(Default)]
struct SupervisorInner {
    process: Option<BackendProcess>,
    last_exit_code: Option<i32>,
    spawn_count: u32,
    tasks: Option<SupervisedTasks>,
}

/// Timers and watchers bound to one `start()`; all of them stop on `cancel`.
struct SupervisedTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SupervisedTasks {
    async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "supervisor task ended abnormally");
            }
        }
    }
}

impl BackendSupervisor {
    pub fn new(launch: BackendLaunch, timing: ProbeTiming, gate: ReadinessGate) -> Arc<Self> {
        Arc::new(Self {
            launch,
            timing,
            gate,
            inner: Mutex::new(SupervisorInner::default()),
        })
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Make sure a backend is reachable, spawning one if needed.
    ///
    /// Never returns an error: spawn failures leave the gate closed with the
    /// cause recorded in `last_error`. Whatever the outcome, the periodic
    /// probe is armed so readiness recovers once it is lost.
    pub async fn start(self: &Arc<Self>) -> StartOutcome {
        if let Some(process) = self.inner.lock().await.process.as_ref() {
            return StartOutcome::AlreadyRunning { pid: process.pid };
        }

        // Probe without holding the lock; snapshots must stay responsive.
        let reachable = self.gate.probe().await;

        let mut inner = self.inner.lock().await;
        if let Some(process) = inner.process.as_ref() {
            return StartOutcome::AlreadyRunning { pid: process.pid };
        }

        // Watchers of a previous, exited process.
        if let Some(stale) = inner.tasks.take() {
            stale.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let mut handles = vec![tokio::spawn(Arc::clone(self).run_periodic_probe(cancel.clone()))];

        let outcome = if reachable {
            info!(port = self.launch.port, "backend already reachable, adopting it");
            StartOutcome::Adopted
        } else {
            match self.spawn_process() {
                Ok(mut child) => {
                    let pid = child.id();
                    let restart_count = inner.spawn_count;
                    inner.spawn_count += 1;
                    inner.process = Some(BackendProcess {
                        pid,
                        started_at: Utc::now(),
                        restart_count,
                    });

                    if let Some(stdout) = child.stdout.take() {
                        handles.push(self.spawn_output_watcher(stdout, OutputStream::Stdout, &cancel));
                    }
                    if let Some(stderr) = child.stderr.take() {
                        handles.push(self.spawn_output_watcher(stderr, OutputStream::Stderr, &cancel));
                    }
                    handles.push(tokio::spawn(Arc::clone(self).watch_exit(child, cancel.clone())));

                    info!(?pid, port = self.launch.port, restart_count, "backend process spawned");
                    StartOutcome::Spawned { pid }
                }
                Err(e) => {
                    let reason = format!("failed to spawn backend: {e}");
                    error!(program = %self.launch.program, workdir = %self.launch.workdir.display(), "{reason}");
                    self.gate.mark_unready(reason.clone());
                    StartOutcome::SpawnFailed(reason)
                }
            }
        };

        inner.tasks = Some(SupervisedTasks { cancel, handles });
        outcome
    }

    /// Cancel every timer, terminate the process if we own it, close the gate.
    pub async fn stop(&self) {
        let tasks = {
            let mut inner = self.inner.lock().await;
            inner.tasks.take()
        };
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        self.inner.lock().await.process = None;
        self.gate.mark_unready("backend stopped");
        info!("backend supervisor stopped");
    }

    pub async fn process(&self) -> Option<BackendProcess> {
        self.inner.lock().await.process.clone()
    }

    pub async fn snapshot(&self) -> BackendSnapshot {
        let readiness = self.gate.snapshot();
        let inner = self.inner.lock().await;
        BackendSnapshot {
            ready: readiness.ready,
            last_checked_at: readiness.last_checked_at,
            last_error: readiness.last_error,
            port: self.launch.port,
            pid: inner.process.as_ref().and_then(|p| p.pid),
            started_at: inner.process.as_ref().map(|p| p.started_at),
            last_exit_code: inner.last_exit_code,
            restart_count: inner.spawn_count.saturating_sub(1),
        }
    }

    fn spawn_process(&self) -> std::io::Result<Child> {
        Command::new(&self.launch.program)
            .args(&self.launch.args)
            .current_dir(&self.launch.workdir)
            .env(&self.launch.port_env, self.launch.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    fn spawn_output_watcher<R>(
        &self,
        reader: R,
        stream: OutputStream,
        cancel: &CancellationToken,
    ) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let gate = self.gate.clone();
        let sentinels = self.launch.sentinels.clone();
        let delay = self.timing.sentinel_delay;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            // Delayed probes die with the watcher, so none outlives stop().
            let mut probes = JoinSet::new();
            let on_sentinel = || {
                let gate = gate.clone();
                let cancel = cancel.clone();
                probes.spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = async {
                            // Give the listener socket time to settle.
                            sleep(delay).await;
                            if !gate.is_ready() {
                                gate.probe().await;
                            }
                        } => {}
                    }
                });
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = output::watch_output(reader, stream, &sentinels, on_sentinel) => {}
            }
            while probes.join_next().await.is_some() {}
        })
    }

    async fn watch_exit(self: Arc<Self>, mut child: Child, cancel: CancellationToken) {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                info!(pid = ?child.id(), "terminating backend process");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill backend process");
                }
                child.wait().await
            }
        };

        let code = match &status {
            Ok(s) => s.code(),
            Err(_) => None,
        };
        match status {
            Ok(s) => info!(?code, "backend process exited: {s}"),
            Err(e) => error!(error = %e, "failed waiting on backend process"),
        }

        {
            let mut inner = self.inner.lock().await;
            inner.process = None;
            inner.last_exit_code = code;
        }
        self.gate
            .mark_unready(format!("backend process exited (code {code:?})"));
    }

    /// Re-probe on a fixed interval while the gate is closed; idle while open.
    async fn run_periodic_probe(self: Arc<Self>, cancel: CancellationToken) {
        let mut readiness = self.gate.subscribe();
        loop {
            if self.gate.is_ready() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    lost = async { readiness.wait_for(|s| !s.ready).await.is_ok() } => {
                        if !lost {
                            return;
                        }
                        warn!("backend readiness lost, resuming periodic probe");
                    }
                }
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = async {
                    sleep(self.timing.interval).await;
                    if !self.gate.is_ready() {
                        self.gate.probe().await;
                    }
                } => {}
            }
        }
    }
}
