mod auth;
mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use scriptorium_common::config::{AuthPolicy, SandboxConfig, ServerConfig};
use scriptorium_common::languages::LanguageTable;
use scriptorium_sandbox::{DockerEngine, Executor};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

pub struct AppState {
    pub executor: Executor,
    pub auth: AuthPolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("Scriptorium API booting...");

    let sandbox_config = SandboxConfig::from_env();
    let server_config = ServerConfig::from_env();

    let languages = match &sandbox_config.languages_config {
        Some(path) => LanguageTable::load(path).map_err(|e| {
            error!("Failed to load language configurations: {}", e);
            e
        })?,
        None => LanguageTable::builtin(),
    };
    info!("Loaded language configurations for: {:?}", languages.names());

    let engine = DockerEngine::connect()?;
    let executor = Executor::new(languages, Arc::new(engine), &sandbox_config);

    info!(
        scratch_root = %sandbox_config.scratch_root.display(),
        timeout_secs = sandbox_config.timeout_secs,
        memory_limit_mb = sandbox_config.memory_limit_mb,
        output_limit_bytes = sandbox_config.output_limit_bytes,
        "Sandbox configured"
    );

    match &server_config.auth {
        AuthPolicy::Open => warn!("POST /execute is open; set EXECUTE_AUTH=token to require bearer tokens"),
        AuthPolicy::BearerTokens(tokens) => info!(tokens = tokens.len(), "POST /execute requires a bearer token"),
    }

    metrics::init();

    let state = Arc::new(AppState {
        executor,
        auth: server_config.auth.clone(),
    });
    let app = routes::app(state, &sandbox_config);

    let listener = TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_config.bind_addr))?;

    info!("HTTP server listening on {}", server_config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight executions...");
}
