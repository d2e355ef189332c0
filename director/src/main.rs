use std::sync::Arc;

use director::{
    api,
    config::Config,
    conversation::Conversation,
    proxy::BackendClient,
    readiness::ReadinessGate,
    supervisor::{BackendSupervisor, StartOutcome},
    AppState,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "director=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(port = config.port, backend_port = config.backend.port, "director starting");

    let base_url = config.backend.base_url();
    let gate = ReadinessGate::new(&base_url, config.probe.timeout);
    let backend = BackendClient::new(&base_url, gate.clone(), config.forward_timeout);
    let supervisor = BackendSupervisor::new(config.backend.clone(), config.probe.clone(), gate);
    let conversation = Conversation::new(Arc::new(backend.clone()), config.scheduler.clone());

    let state = Arc::new(AppState {
        port: config.port,
        backend,
        supervisor: Arc::clone(&supervisor),
        conversation: conversation.clone(),
    });
    let app = api::router(state);

    // Listen before the backend is up; the gate answers 503 until then.
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    match supervisor.start().await {
        StartOutcome::SpawnFailed(reason) => error!(%reason, "backend could not be started"),
        outcome => info!(?outcome, "backend supervisor started"),
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    conversation.shutdown().await;
    supervisor.stop().await;
    served?;
    info!("director stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
