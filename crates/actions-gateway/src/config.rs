//! Gateway configuration
//!
//! Every setting can be given as a flag or an environment variable. A `.env`
//! file is loaded before parsing.

use actions_mcp::clients::{BackendConfig, DEFAULT_API_URI};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

/// Which actions backend new sessions talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// The Membrane HTTP API
    Membrane,

    /// In-memory two-integration backend that echoes action input
    Fixture,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Gateway settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "actions-gateway", version, about = "Serve integration actions as MCP tools")]
pub struct GatewayConfig {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Actions backend base URL
    #[arg(long, env = "MEMBRANE_API_URI", default_value = DEFAULT_API_URI)]
    pub membrane_api_uri: String,

    /// Per-request backend timeout in seconds
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 30)]
    pub backend_timeout_secs: u64,

    /// Retries after a transient backend read failure
    #[arg(long, env = "BACKEND_MAX_RETRIES", default_value_t = 3)]
    pub backend_max_retries: u32,

    /// Shared secret for verifying credentials. Unset means decode only.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Comma-separated allowed origins, `*` for any
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Actions backend
    #[arg(long, env = "BACKEND", value_enum, default_value_t = BackendKind::Membrane)]
    pub backend: BackendKind,
}

impl GatewayConfig {
    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Backend client settings.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.membrane_api_uri.trim_end_matches('/').to_string(),
            timeout_secs: self.backend_timeout_secs,
            max_retries: self.backend_max_retries,
            ..BackendConfig::default()
        }
    }

    /// Allowed origins. Empty means any origin.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty() && *o != "*")
            .map(str::to_string)
            .collect()
    }
}
