use actions_gateway::middleware::cors::build_cors_layer;
use actions_gateway::{app, build_state, init_tracing, GatewayConfig, StartupError};
use clap::Parser;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::parse();
    init_tracing(config.log_format);

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "Gateway stopped");
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let state = build_state(&config)?;
    let router = app(state, build_cors_layer(&config.allowed_origins()));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, backend = ?config.backend, "Actions gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
