//! MCP server implementation
//!
//! One [`McpServer`] serves one session: it owns the session's tools, their
//! visibility flags and the server-to-client message channel, and answers
//! JSON-RPC messages.

use crate::schema::ObjectShape;
use crate::types::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

/// MCP server error types.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Tool not found
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    /// Tool is registered but hidden
    #[error("Tool {0} disabled")]
    ToolDisabled(String),

    /// A tool with the same name is already registered
    #[error("Tool {0} is already registered")]
    DuplicateTool(String),

    /// Tool execution failed
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for MCP server operations.
pub type McpServerResult<T> = Result<T, McpServerError>;

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Shape the arguments are validated against before `execute` runs.
    /// `None` passes arguments through untouched.
    fn input_shape(&self) -> Option<&ObjectShape> {
        None
    }

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: Value, context: &ToolContext) -> McpServerResult<ToolResult>;
}

/// Context for tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Session the call arrived on
    pub session_id: Option<String>,

    /// Caller user ID
    pub user_id: Option<String>,

    /// Request correlation ID (the JSON-RPC id)
    pub correlation_id: Option<String>,
}

impl ToolContext {
    /// Create an empty context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for a call made on `session_id` by `user_id`.
    pub fn for_session(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_id: Some(user_id.into()),
            correlation_id: None,
        }
    }
}

/// A registered tool plus its session-scoped visibility flag.
struct ToolEntry {
    tool: Arc<dyn Tool>,
    enabled: bool,
}

/// Session MCP server.
pub struct McpServer {
    /// Server info
    info: ServerInfo,

    /// Server capabilities
    capabilities: ServerCapabilities,

    /// Registered tools, keyed by name
    tools: RwLock<BTreeMap<String, ToolEntry>>,

    /// Server-to-client channel, when a stream is attached
    outbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
}

impl McpServer {
    /// Create a new MCP server.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolCapabilities { list_changed: true }),
                experimental: HashMap::new(),
            },
            tools: RwLock::new(BTreeMap::new()),
            outbound: Mutex::new(None),
        }
    }

    /// Create with the default server identity.
    pub fn integration_app() -> Self {
        Self::new("Integration App MCP Server", env!("CARGO_PKG_VERSION"))
    }

    /// Register a visible tool.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> McpServerResult<()> {
        self.insert_tool(tool, true).await
    }

    /// Register a tool that stays hidden until enabled.
    pub async fn register_disabled_tool(&self, tool: Arc<dyn Tool>) -> McpServerResult<()> {
        self.insert_tool(tool, false).await
    }

    async fn insert_tool(&self, tool: Arc<dyn Tool>, enabled: bool) -> McpServerResult<()> {
        let name = tool.definition().name;
        let mut tools = self.tools.write().await;

        match tools.entry(name) {
            Entry::Occupied(entry) => Err(McpServerError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(ToolEntry { tool, enabled });
                Ok(())
            }
        }
    }

    /// Whether a tool of that name is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Whether the named tool is registered and visible.
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.tools
            .read()
            .await
            .get(name)
            .is_some_and(|entry| entry.enabled)
    }

    /// Number of registered tools, hidden ones included.
    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Get definitions of all visible tools, ordered by name.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        tools
            .values()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.tool.definition())
            .collect()
    }

    /// Hide every tool in `previous`, then show every registered tool in
    /// `requested`, under one lock. Returns the names that were shown, in
    /// request order and without duplicates.
    pub async fn replace_enabled(&self, previous: &[String], requested: &[String]) -> Vec<String> {
        let mut tools = self.tools.write().await;

        for name in previous {
            if let Some(entry) = tools.get_mut(name) {
                entry.enabled = false;
            }
        }

        let mut shown = Vec::new();
        for name in requested {
            if shown.contains(name) {
                continue;
            }
            if let Some(entry) = tools.get_mut(name) {
                entry.enabled = true;
                shown.push(name.clone());
            }
        }
        shown
    }

    /// Execute a tool.
    ///
    /// Unknown and hidden tools are rejected, then the arguments are checked
    /// against the tool's input shape.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let tool = {
            let tools = self.tools.read().await;
            let entry = tools
                .get(name)
                .ok_or_else(|| McpServerError::ToolNotFound(name.to_string()))?;
            if !entry.enabled {
                return Err(McpServerError::ToolDisabled(name.to_string()));
            }
            Arc::clone(&entry.tool)
        };

        let arguments = arguments.unwrap_or(Value::Null);
        let arguments = match tool.input_shape() {
            Some(shape) => shape.parse(&arguments).map_err(|e| {
                McpServerError::InvalidParams(format!("Invalid arguments for tool {}: {}", name, e))
            })?,
            None if arguments.is_null() => json!({}),
            None => arguments,
        };

        tool.execute(arguments, context).await
    }

    /// Attach a server-to-client stream, replacing any earlier one.
    pub async fn open_stream(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.outbound.lock().await.replace(tx).is_some() {
            debug!("Replaced existing server-to-client stream");
        }
        rx
    }

    /// Detach the server-to-client stream.
    pub async fn close_stream(&self) {
        self.outbound.lock().await.take();
    }

    /// Whether a server-to-client stream is attached.
    pub async fn has_stream(&self) -> bool {
        self.outbound
            .lock()
            .await
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push a message to the attached stream. Returns false when nothing
    /// is listening.
    pub async fn send_to_client(&self, message: Value) -> bool {
        let mut outbound = self.outbound.lock().await;
        match outbound.as_ref() {
            Some(tx) if tx.send(message).is_ok() => true,
            Some(_) => {
                outbound.take();
                false
            }
            None => false,
        }
    }

    /// Tell the client its tool list changed.
    pub async fn notify_tools_changed(&self) {
        let notification = match serde_json::to_value(McpNotification::tools_list_changed()) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Could not serialize tools/list_changed");
                return;
            }
        };
        if !self.send_to_client(notification).await {
            debug!("No stream attached, tools/list_changed not delivered");
        }
    }

    /// Handle a request body: a single message or a batch.
    ///
    /// Returns `None` when nothing needs answering (only notifications or
    /// client responses).
    pub async fn handle_body(&self, body: Value, context: &ToolContext) -> Option<Value> {
        match body {
            Value::Array(messages) if messages.is_empty() => Some(
                McpResponse::error(RequestId::Null, McpError::invalid_request()).to_value(),
            ),
            Value::Array(messages) => {
                let mut responses = Vec::new();
                for message in messages {
                    if let Some(response) = self.handle_message(message, context).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(Value::Array(responses))
            }
            message => self.handle_message(message, context).await,
        }
    }

    /// Handle one JSON-RPC message.
    pub async fn handle_message(&self, message: Value, context: &ToolContext) -> Option<Value> {
        if is_client_response(&message) {
            debug!("Ignoring response message from client");
            return None;
        }

        let request: McpRequest = match serde_json::from_value(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = message
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok())
                    .unwrap_or(RequestId::Null);
                return Some(
                    McpResponse::error(id, McpError::invalid_request().with_data(json!(e.to_string())))
                        .to_value(),
                );
            }
        };

        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "Received notification");
            return None;
        };

        let mut context = context.clone();
        context.correlation_id = Some(id.to_string());
        Some(self.handle_request(id, request, &context).await.to_value())
    }

    /// Handle an MCP request.
    pub async fn handle_request(
        &self,
        id: RequestId,
        request: McpRequest,
        context: &ToolContext,
    ) -> McpResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params, context).await,
            _ => McpResponse::error(id, McpError::method_not_found(&request.method)),
        }
    }

    fn handle_initialize(&self, id: RequestId, params: Option<Value>) -> McpResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        let protocol_version = params
            .protocol_version
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(LATEST_PROTOCOL_VERSION);

        if let Some(client) = &params.client_info {
            debug!(client = %client.name, version = %client.version, protocol_version, "Client initializing");
        }

        McpResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "capabilities": self.capabilities,
                "serverInfo": self.info
            }),
        )
    }

    async fn handle_tools_list(&self, id: RequestId) -> McpResponse {
        let tools = self.list_tools().await;
        McpResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        id: RequestId,
        params: Option<Value>,
        context: &ToolContext,
    ) -> McpResponse {
        let params = match params {
            Some(p) => p,
            None => return McpResponse::error(id, McpError::invalid_params("Missing params")),
        };

        let call: ToolCall = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => return McpResponse::error(id, McpError::invalid_params(e.to_string())),
        };

        let result = match self.call_tool(&call.name, call.arguments, context).await {
            Ok(result) => result,
            Err(
                e @ (McpServerError::ToolNotFound(_)
                | McpServerError::ToolDisabled(_)
                | McpServerError::InvalidParams(_)),
            ) => return McpResponse::error(id, McpError::invalid_params(e.to_string())),
            Err(McpServerError::ExecutionError(message)) => {
                warn!(tool = %call.name, error = %message, "Tool execution failed");
                ToolResult::error(message)
            }
            Err(e) => return McpResponse::error(id, McpError::internal_error(e.to_string())),
        };

        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        }
    }

    /// Get server info.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Get server capabilities.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }
}

fn is_client_response(message: &Value) -> bool {
    message.get("method").is_none()
        && message.get("id").is_some()
        && (message.get("result").is_some() || message.get("error").is_some())
}
