//! # Actions Gateway
//!
//! HTTP front end of the actions MCP engine.
//!
//! ## Endpoints
//!
//! - `POST|GET|DELETE /mcp`: streamable HTTP transport
//! - `GET /sse`, `POST /sse/messages`: legacy HTTP+SSE transport
//! - `GET /`, `GET /health`: liveness
//!
//! Every MCP endpoint requires a bearer credential, either as an
//! `Authorization: Bearer` header or a `token` query parameter. The
//! credential is forwarded to the actions backend on every call made for
//! the session.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use actions_auth::{AuthError, JwtService};
use actions_mcp::clients::{
    BackendError, BackendFactory, ConfigError, FixtureBackend, FixtureBackendFactory,
    MembraneClientFactory,
};
use actions_mcp::SessionManager;
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{BackendKind, GatewayConfig, LogFormat};
pub use state::AppState;

/// Errors that stop the gateway from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend client setup failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Credential verifier setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid bind address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the global tracing subscriber.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "actions_gateway=debug,actions_mcp=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Build the shared state from configuration.
pub fn build_state(config: &GatewayConfig) -> Result<AppState, StartupError> {
    let factory: Arc<dyn BackendFactory> = match config.backend {
        BackendKind::Membrane => {
            let backend = config.backend_config();
            backend.validate()?;
            Arc::new(MembraneClientFactory::new(backend)?)
        }
        BackendKind::Fixture => {
            tracing::warn!("Serving the in-memory fixture backend");
            Arc::new(FixtureBackendFactory::new(FixtureBackend::sample()))
        }
    };

    let jwt = match config.jwt_secret.as_deref() {
        Some(secret) => JwtService::with_secret(secret)?,
        None => {
            tracing::warn!("JWT_SECRET not set, credentials are decoded without verification");
            JwtService::decode_only()
        }
    };

    Ok(AppState::new(SessionManager::new(factory), jwt))
}

/// Request span carrying the URI with the credential masked.
fn request_span(req: &axum::extract::Request) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        uri = %middleware::access_log::redact_uri(req.uri()),
        version = ?req.version(),
    )
}

/// Assemble the router.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::mcp::router())
        .merge(routes::sse::router())
        .layer(middleware::access_log::AccessLogLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::inject_caller,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(cors),
        )
        .with_state(state)
}
