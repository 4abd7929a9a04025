//! # Actions MCP
//!
//! This crate exposes the actions of a user's connected integrations as MCP
//! (Model Context Protocol) tools, one tool session per client connection.
//!
//! ## Overview
//!
//! The actions-mcp crate handles:
//! - **Catalog**: listing the caller's connections and each integration's actions
//! - **Tools**: one schema-validated tool per action, named `<integration>_<action>`
//! - **Dynamic mode**: tools hidden behind an `enable-tools` meta-tool
//! - **Sessions**: per-connection servers for the streamable and legacy transports
//! - **Clients**: the actions backend interface and its HTTP implementation
//!
//! ## MCP Protocol
//!
//! Supported methods:
//! - `initialize`: Negotiate the protocol version
//! - `ping`: Liveness check
//! - `tools/list`: List the visible tools
//! - `tools/call`: Execute a tool
//!
//! The server announces `tools.listChanged` and sends
//! `notifications/tools/list_changed` whenever dynamic mode changes the
//! visible tools.
//!
//! ## Usage
//!
//! ### Building a session
//!
//! ```rust,no_run
//! use actions_auth::CallerIdentity;
//! use actions_mcp::clients::{BackendConfig, MembraneClientFactory};
//! use actions_mcp::session::{SessionManager, SessionOptions, TransportKind};
//! use std::sync::Arc;
//!
//! async fn setup(caller: CallerIdentity) {
//!     let factory = MembraneClientFactory::new(BackendConfig::default()).unwrap();
//!     let sessions = SessionManager::new(Arc::new(factory));
//!
//!     let options = SessionOptions::from_request(Some("gmail"), None, Some("dynamic"), None);
//!     let session = sessions
//!         .create_session(TransportKind::Streamable, &caller, &options)
//!         .await
//!         .unwrap();
//!
//!     let tools = session.server().list_tools().await;
//!     println!("Session {} exposes {} tools", session.id(), tools.len());
//! }
//! ```
//!
//! ### Handling MCP messages
//!
//! ```rust,no_run
//! use actions_mcp::{McpServer, ToolContext};
//!
//! async fn handle(server: &McpServer, json: &str) {
//!     let body: serde_json::Value = serde_json::from_str(json).unwrap();
//!     if let Some(response) = server.handle_body(body, &ToolContext::empty()).await {
//!         println!("{}", response);
//!     }
//! }
//! ```

pub mod catalog;
pub mod clients;
pub mod retry;
pub mod schema;
pub mod server;
pub mod session;
pub mod tools;
pub mod types;

// Re-export main types
pub use catalog::{list_actions, CatalogFilter};
pub use retry::{with_retry_if, RetryConfig};
pub use schema::{translate_schema, FieldType, ObjectShape, ValidationError};
pub use server::{McpServer, McpServerError, McpServerResult, Tool, ToolContext};
pub use session::{
    Session, SessionCounts, SessionError, SessionManager, SessionOptions, SessionStream,
    StreamableReply, TransportKind,
};
pub use tools::{register_catalog_tools, ToolMode, ENABLE_TOOLS_NAME};
pub use types::{
    is_initialize_request, ContentBlock, McpError, McpNotification, McpRequest, McpResponse,
    RequestId, ServerCapabilities, ServerInfo, ToolCall, ToolCapabilities, ToolDefinition,
    ToolResult, LATEST_PROTOCOL_VERSION,
};

// Re-export backend clients
pub use clients::{
    ActionsBackend, BackendConfig, BackendError, BackendFactory, FixtureBackend,
    FixtureBackendFactory, MembraneClient, MembraneClientFactory,
};
