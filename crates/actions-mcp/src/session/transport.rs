//! Sessions and their server-to-client streams.

use super::SessionManager;
use crate::catalog::CatalogFilter;
use crate::clients::ActionsBackend;
use crate::server::{McpServer, ToolContext};
use crate::tools::{DynamicToolSet, ToolMode};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Transport a session was opened on. Each kind has its own id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Streamable HTTP (`/mcp`)
    Streamable,

    /// Legacy HTTP+SSE (`/sse`)
    Legacy,
}

impl TransportKind {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Streamable => "streamable",
            TransportKind::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of one session.
pub struct Session {
    pub(super) id: String,
    pub(super) kind: TransportKind,
    pub(super) user_id: String,
    pub(super) chat_id: Option<String>,
    pub(super) mode: ToolMode,
    pub(super) filter: CatalogFilter,
    pub(super) created_at: DateTime<Utc>,
    pub(super) server: Arc<McpServer>,
    pub(super) backend: Arc<dyn ActionsBackend>,
    pub(super) dynamic: Option<Arc<DynamicToolSet>>,
    pub(super) closed: AtomicBool,
}

impl Session {
    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transport kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Owning user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Chat id the session was opened for.
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Tool mode.
    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    /// Catalog filter the tools were built with.
    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The session's MCP server.
    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    /// Backend client scoped to the session's caller.
    pub fn backend(&self) -> &Arc<dyn ActionsBackend> {
        &self.backend
    }

    /// Enabled-tools working set (dynamic mode only).
    pub fn dynamic_tools(&self) -> Option<&Arc<DynamicToolSet>> {
        self.dynamic.as_ref()
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the session closed. True only for the first caller.
    pub(super) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Handle a JSON-RPC body on this session.
    pub async fn handle(&self, body: Value) -> Option<Value> {
        let context = ToolContext::for_session(self.id.clone(), self.user_id.clone());
        self.server.handle_body(body, &context).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes a session when the stream holding it is dropped.
struct CloseOnDrop {
    manager: SessionManager,
    kind: TransportKind,
    id: String,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.manager.close_session(self.kind, &self.id);
    }
}

/// Server-to-client messages of one session.
///
/// For legacy sessions the stream owns the session: dropping it (the client
/// disconnected) closes the session.
pub struct SessionStream {
    inner: UnboundedReceiverStream<Value>,
    _close: Option<CloseOnDrop>,
}

impl SessionStream {
    pub(super) fn detached(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            _close: None,
        }
    }

    pub(super) fn owning(
        rx: mpsc::UnboundedReceiver<Value>,
        manager: SessionManager,
        kind: TransportKind,
        id: String,
    ) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            _close: Some(CloseOnDrop { manager, kind, id }),
        }
    }
}

impl Stream for SessionStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
