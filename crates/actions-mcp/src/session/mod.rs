//! Session lifecycle for both transports.
//!
//! A session is created by an `initialize` request (streamable transport) or
//! by opening the event stream (legacy transport). Creation builds a backend
//! client for the caller, fetches the action catalog and registers the tools
//! before the session id is published, so the first request is answered by a
//! fully populated server.
//!
//! Streamable and legacy sessions live in separate maps; an id from one is
//! never valid on the other.

pub mod registry;
pub mod transport;

pub use registry::{SessionRegistry, UserSessions};
pub use transport::{Session, SessionStream, TransportKind};

use crate::catalog::{list_actions, CatalogFilter};
use crate::clients::{BackendError, BackendFactory};
use crate::server::{McpServer, McpServerError};
use crate::tools::{register_catalog_tools, ToolMode};
use crate::types::{is_initialize_request, McpError};
use actions_auth::CallerIdentity;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session id on a request that is not an `initialize`.
    #[error("Bad Request: No valid session ID provided")]
    MissingSessionId,

    /// The id is unknown, closed, or owned by another user.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Building the catalog failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Registering tools failed.
    #[error("Server error: {0}")]
    Server(#[from] McpServerError),

    /// A live session already uses the id.
    #[error("Session {0} already exists")]
    DuplicateSession(String),

    /// The session has no open stream to deliver to.
    #[error("No open stream for session {0}")]
    TransportClosed(String),
}

impl SessionError {
    /// JSON-RPC error object for this failure.
    pub fn rpc_error(&self) -> McpError {
        match self {
            SessionError::MissingSessionId => McpError::missing_session(),
            SessionError::SessionNotFound(_) => McpError::session_not_found(),
            other => McpError::internal_error(other.to_string()),
        }
    }
}

/// How a new session builds its tools.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Which connections to include
    pub filter: CatalogFilter,

    /// Static or dynamic tools
    pub mode: ToolMode,

    /// Chat the session belongs to (defaults to the session id)
    pub chat_id: Option<String>,
}

impl SessionOptions {
    /// Build options from the request query and the `x-chat-id` header.
    pub fn from_request(
        apps: Option<&str>,
        integration_key: Option<&str>,
        mode: Option<&str>,
        chat_id: Option<&str>,
    ) -> Self {
        Self {
            filter: CatalogFilter::from_query(apps, integration_key),
            mode: ToolMode::from_query(mode),
            chat_id: chat_id
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }
}

/// Outcome of a streamable POST.
#[derive(Debug)]
pub struct StreamableReply {
    /// Session the body was handled on
    pub session_id: String,

    /// Whether the request created the session
    pub created: bool,

    /// JSON-RPC response(s), `None` when the body needed no answer
    pub responses: Option<Value>,
}

/// Live session counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    /// Streamable sessions
    pub streamable: usize,

    /// Legacy sessions
    pub legacy: usize,
}

struct ManagerInner {
    factory: Arc<dyn BackendFactory>,
    streamable: SessionRegistry<Session>,
    legacy: SessionRegistry<Session>,
    users: UserSessions,
}

/// Owns every live session of the process.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager building backends with `factory`.
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                factory,
                streamable: SessionRegistry::new(),
                legacy: SessionRegistry::new(),
                users: UserSessions::new(),
            }),
        }
    }

    fn registry(&self, kind: TransportKind) -> &SessionRegistry<Session> {
        match kind {
            TransportKind::Streamable => &self.inner.streamable,
            TransportKind::Legacy => &self.inner.legacy,
        }
    }

    /// Build a session with its full tool set. Not yet reachable by id.
    #[instrument(skip(self, caller, options), fields(user_id = %caller.user_id, mode = %options.mode))]
    async fn build_session(
        &self,
        kind: TransportKind,
        caller: &CallerIdentity,
        options: &SessionOptions,
    ) -> Result<Arc<Session>, SessionError> {
        let backend = self.inner.factory.for_credential(&caller.token)?;
        let actions = list_actions(backend.as_ref(), &options.filter).await?;

        let server = Arc::new(McpServer::integration_app());
        let tools = register_catalog_tools(&server, &actions, Arc::clone(&backend), options.mode)
            .await?;

        Ok(Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            kind,
            user_id: caller.user_id.clone(),
            chat_id: options.chat_id.clone(),
            mode: options.mode,
            filter: options.filter.clone(),
            created_at: Utc::now(),
            server,
            backend,
            dynamic: tools.dynamic,
            closed: AtomicBool::new(false),
        }))
    }

    /// Publish a built session under its id.
    fn register(&self, session: &Arc<Session>) -> Result<(), SessionError> {
        self.registry(session.kind)
            .insert(session.id.clone(), Arc::clone(session))?;
        self.inner
            .users
            .add(&session.user_id, session.chat_id(), &session.id);

        info!(
            session_id = %session.id,
            transport = %session.kind,
            user_id = %session.user_id,
            mode = %session.mode,
            "Session created"
        );
        Ok(())
    }

    /// Create and publish a session.
    pub async fn create_session(
        &self,
        kind: TransportKind,
        caller: &CallerIdentity,
        options: &SessionOptions,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.build_session(kind, caller, options).await?;
        self.register(&session)?;
        Ok(session)
    }

    /// Look up a live session owned by `caller`.
    pub fn session(
        &self,
        kind: TransportKind,
        id: &str,
        caller: &CallerIdentity,
    ) -> Result<Arc<Session>, SessionError> {
        match self.registry(kind).get(id) {
            Some(session) if session.user_id == caller.user_id && !session.is_closed() => {
                Ok(session)
            }
            Some(_) => {
                warn!(session_id = %id, user_id = %caller.user_id, "Session belongs to another user");
                Err(SessionError::SessionNotFound(id.to_string()))
            }
            None => Err(SessionError::SessionNotFound(id.to_string())),
        }
    }

    /// Handle a POST on the streamable transport.
    ///
    /// With a session id the body is routed to that session. Without one
    /// only an `initialize` body is accepted, and it creates the session.
    pub async fn handle_streamable_post(
        &self,
        session_id: Option<&str>,
        caller: &CallerIdentity,
        options: &SessionOptions,
        body: Value,
    ) -> Result<StreamableReply, SessionError> {
        let (session, created) = match session_id {
            Some(id) => (self.session(TransportKind::Streamable, id, caller)?, false),
            None if is_initialize_request(&body) => (
                self.create_session(TransportKind::Streamable, caller, options)
                    .await?,
                true,
            ),
            None => return Err(SessionError::MissingSessionId),
        };

        let responses = session.handle(body).await;
        Ok(StreamableReply {
            session_id: session.id.clone(),
            created,
            responses,
        })
    }

    /// Attach the server-to-client stream of a streamable session. A second
    /// stream replaces the first.
    pub async fn open_streamable_stream(
        &self,
        session_id: &str,
        caller: &CallerIdentity,
    ) -> Result<SessionStream, SessionError> {
        let session = self.session(TransportKind::Streamable, session_id, caller)?;
        let rx = session.server.open_stream().await;
        debug!(session_id = %session_id, "Opened streamable event stream");
        Ok(SessionStream::detached(rx))
    }

    /// Terminate a streamable session.
    pub async fn terminate_streamable(
        &self,
        session_id: &str,
        caller: &CallerIdentity,
    ) -> Result<(), SessionError> {
        let session = self.session(TransportKind::Streamable, session_id, caller)?;
        self.close_session(TransportKind::Streamable, session_id);
        session.server.close_stream().await;
        Ok(())
    }

    /// Open a legacy session. The returned stream owns the session.
    pub async fn open_legacy(
        &self,
        caller: &CallerIdentity,
        options: &SessionOptions,
    ) -> Result<(Arc<Session>, SessionStream), SessionError> {
        let session = self
            .build_session(TransportKind::Legacy, caller, options)
            .await?;
        let rx = session.server.open_stream().await;
        self.register(&session)?;

        let stream = SessionStream::owning(
            rx,
            self.clone(),
            TransportKind::Legacy,
            session.id.clone(),
        );
        Ok((session, stream))
    }

    /// Handle a POST on the legacy transport. Responses are delivered on the
    /// session's event stream.
    ///
    /// Returns once the message has been handled and every response is
    /// queued on the stream, so the caller's `202 Accepted` never precedes
    /// the response event and errors such as a closed stream still reach the
    /// POST. The cost is that a slow action run holds the POST open until
    /// the backend answers.
    pub async fn handle_legacy_post(
        &self,
        session_id: &str,
        caller: &CallerIdentity,
        body: Value,
    ) -> Result<(), SessionError> {
        let session = self.session(TransportKind::Legacy, session_id, caller)?;

        let messages = match session.handle(body).await {
            Some(Value::Array(responses)) => responses,
            Some(response) => vec![response],
            None => return Ok(()),
        };

        for message in messages {
            if !session.server.send_to_client(message).await {
                self.close_session(TransportKind::Legacy, session_id);
                return Err(SessionError::TransportClosed(session_id.to_string()));
            }
        }
        Ok(())
    }

    /// Remove a session. Safe to call any number of times; only the first
    /// call has an effect. Returns whether this call removed it.
    pub fn close_session(&self, kind: TransportKind, session_id: &str) -> bool {
        let Some(session) = self.registry(kind).remove(session_id) else {
            return false;
        };
        if !session.mark_closed() {
            return false;
        }

        self.inner
            .users
            .remove(&session.user_id, session.chat_id(), &session.id);

        info!(
            session_id = %session_id,
            transport = %kind,
            lifetime_secs = (Utc::now() - session.created_at).num_seconds(),
            "Session closed"
        );
        true
    }

    /// Live session counts.
    pub fn counts(&self) -> SessionCounts {
        SessionCounts {
            streamable: self.inner.streamable.len(),
            legacy: self.inner.legacy.len(),
        }
    }

    /// Chat id to session id map of a user.
    pub fn sessions_for_user(&self, user_id: &str) -> HashMap<String, String> {
        self.inner.users.sessions_for_user(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{FixtureBackend, FixtureBackendFactory};
    use serde_json::json;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(FixtureBackendFactory::new(FixtureBackend::sample())))
    }

    fn caller(user: &str) -> CallerIdentity {
        CallerIdentity {
            user_id: user.to_string(),
            token: format!("token-{}", user),
        }
    }

    fn initialize() -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2025-03-26"}})
    }

    #[test]
    fn test_options_from_request() {
        let options = SessionOptions::from_request(Some("gmail"), None, Some("dynamic"), Some(" "));
        assert_eq!(options.filter, CatalogFilter::Apps(vec!["gmail".to_string()]));
        assert_eq!(options.mode, ToolMode::Dynamic);
        assert!(options.chat_id.is_none());
    }

    #[tokio::test]
    async fn test_initialize_creates_session() {
        let manager = manager();
        let reply = manager
            .handle_streamable_post(None, &caller("u1"), &SessionOptions::default(), initialize())
            .await
            .unwrap();

        assert!(reply.created);
        assert_eq!(reply.responses.unwrap()["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(manager.counts().streamable, 1);
        assert_eq!(
            manager.sessions_for_user("u1").get(&reply.session_id),
            Some(&reply.session_id)
        );
    }

    #[tokio::test]
    async fn test_missing_and_unknown_session_ids() {
        let manager = manager();
        let ping = json!({"jsonrpc": "2.0", "id": 2, "method": "ping"});

        let err = manager
            .handle_streamable_post(None, &caller("u1"), &SessionOptions::default(), ping.clone())
            .await
            .unwrap_err();
        assert_eq!(err.rpc_error().code, McpError::BAD_SESSION_REQUEST);

        let err = manager
            .handle_streamable_post(Some("nope"), &caller("u1"), &SessionOptions::default(), ping)
            .await
            .unwrap_err();
        assert_eq!(err.rpc_error().code, McpError::SESSION_NOT_FOUND);
        assert_eq!(manager.counts(), SessionCounts::default());
    }

    #[tokio::test]
    async fn test_session_of_other_user_is_not_found() {
        let manager = manager();
        let reply = manager
            .handle_streamable_post(None, &caller("u1"), &SessionOptions::default(), initialize())
            .await
            .unwrap();

        let err = manager
            .session(TransportKind::Streamable, &reply.session_id, &caller("u2"))
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_terminate_closes_once() {
        let manager = manager();
        let user = caller("u1");
        let reply = manager
            .handle_streamable_post(None, &user, &SessionOptions::default(), initialize())
            .await
            .unwrap();

        manager.terminate_streamable(&reply.session_id, &user).await.unwrap();
        assert!(!manager.close_session(TransportKind::Streamable, &reply.session_id));
        assert!(manager
            .terminate_streamable(&reply.session_id, &user)
            .await
            .is_err());
        assert!(manager.sessions_for_user("u1").is_empty());
    }

    #[tokio::test]
    async fn test_legacy_session_closes_when_stream_drops() {
        use futures::StreamExt;

        let manager = manager();
        let user = caller("u1");
        let (session, mut stream) = manager
            .open_legacy(&user, &SessionOptions::default())
            .await
            .unwrap();

        manager
            .handle_legacy_post(session.id(), &user, json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}))
            .await
            .unwrap();
        let response = stream.next().await.unwrap();
        assert_eq!(response["id"], 9);

        // Legacy ids are not valid on the streamable transport.
        assert!(manager
            .session(TransportKind::Streamable, session.id(), &user)
            .is_err());

        drop(stream);
        assert_eq!(manager.counts().legacy, 0);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_legacy_post_returns_after_response_is_queued() {
        use futures::{FutureExt, StreamExt};

        let manager = manager();
        let user = caller("u1");
        let (session, mut stream) = manager
            .open_legacy(&user, &SessionOptions::default())
            .await
            .unwrap();

        manager
            .handle_legacy_post(
                session.id(),
                &user,
                json!([
                    {"jsonrpc": "2.0", "id": 1, "method": "ping"},
                    {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
                ]),
            )
            .await
            .unwrap();

        let first = stream.next().now_or_never().flatten().unwrap();
        let second = stream.next().now_or_never().flatten().unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert!(second["result"]["tools"].is_array());
    }

    #[tokio::test]
    async fn test_failed_connection_listing_creates_no_session() {
        let manager = SessionManager::new(Arc::new(FixtureBackendFactory::new(
            FixtureBackend::sample().with_failing_connections(),
        )));

        let err = manager
            .handle_streamable_post(None, &caller("u1"), &SessionOptions::default(), initialize())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));
        assert_eq!(manager.counts(), SessionCounts::default());
    }
}
