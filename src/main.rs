//! Process entry point: installs tracing, loads configuration, wires
//! the in-memory repository adapters (the fixture backend shipped with
//! this crate; a production deployment swaps these for a real store),
//! and serves the n8n webhook surface.

use std::sync::Arc;

use mxf::dag::DagEngine;
use mxf::repository::memory::{InMemoryChannelRepository, InMemoryTaskRepository};
use mxf::task::TaskService;
use mxf::webhooks::{router, AppState};
use mxf::MxfConfig;

fn init_tracing(config: &MxfConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MXF_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!(bind = %config.webhook_bind, "starting mxf coordination core");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MxfConfig::from_env();
    init_tracing(&config);

    let dag = Arc::new(DagEngine::new());
    let tasks_repo = Arc::new(InMemoryTaskRepository::default());
    let channels = Arc::new(InMemoryChannelRepository::default());

    let state = Arc::new(AppState {
        tasks: TaskService::new(tasks_repo, dag.clone()),
        channels,
        dag,
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.webhook_bind).await?;
    tracing::info!(addr = %config.webhook_bind, "webhook surface listening");
    axum::serve(listener, app).await?;

    Ok(())
}
