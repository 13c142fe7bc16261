//! Gemini Gateway - Main entry point
//!
//! This binary loads configuration from the environment, creates the upstream
//! client and runs the HTTP server until Ctrl-C or SIGTERM.

use anyhow::Result;
use gemini_gateway::{
    build_router,
    core::{init_metrics, init_tracing, AppConfig},
    AppState, GeminiClient,
};
use std::sync::Arc;

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(worker_threads) = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
    {
        builder.worker_threads(worker_threads);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();
    init_metrics();

    let config = AppConfig::from_env()?;
    tracing::info!(
        model = %config.default_model,
        api_base = %config.api_base,
        thinking_budget = ?config.thinking_budget,
        timeout_secs = config.request_timeout_secs,
        "Configuration loaded"
    );

    let client = GeminiClient::new(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(AppState::new(config, Arc::new(client)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting Gemini Gateway on {}", addr);
    tracing::info!("Generation API: /prompt, /chat, /stream");
    tracing::info!("OpenAPI document: /api-docs/openapi.json");
    tracing::info!("Metrics endpoint: /metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
