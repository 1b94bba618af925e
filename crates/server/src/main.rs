// crates/server/src/main.rs
//! scarab-server binary.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scarab_server::{create_app, metrics::init_metrics, AppState, LogFormat, ServerConfig};
use scarab_server_jobs::spawn_sweeper;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,scarab_server=info,scarab_server_jobs=info,tower_http=info";

/// How long shutdown waits for in-flight analyzer runs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_format);
    init_metrics();

    for dir in [&config.uploads_dir, &config.results_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let state = AppState::new(&config);
    if !state.runner.config().analyzer_available() {
        tracing::warn!(
            program = %config.analyzer_program.display(),
            script = %config.analyzer_script,
            "analyzer not found; submissions will be rejected until it is installed"
        );
    }

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        state.store.clone(),
        config.sweep_interval(),
        config.retention(),
        cancel.clone(),
    );

    let app = create_app(state.clone(), &config.cors_origins);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        addr = %addr,
        uploads = %config.uploads_dir.display(),
        results = %config.results_dir.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "scarab server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "sweeper task ended abnormally");
    }

    let in_flight = state.runner.in_flight();
    if in_flight > 0 {
        tracing::info!(in_flight, "waiting for running analyses");
        if tokio::time::timeout(SHUTDOWN_GRACE, state.runner.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = state.runner.in_flight(),
                "analyses still running at exit; they will be killed"
            );
        }
    }

    Ok(())
}
