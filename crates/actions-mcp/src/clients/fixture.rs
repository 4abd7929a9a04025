//! In-memory actions backend.
//!
//! Serves a fixed catalog from memory and echoes action input back as the
//! run output. Used for local development (`BACKEND=fixture`) and as the test
//! double of the session and catalog tests.

use super::backend::{
    Action, ActionInstanceSelector, ActionQuery, ActionRunResult, ActionsBackend, BackendError,
    BackendFactory, Connection, ConnectionQuery, Integration, Page,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Prefix of the echoed run output.
pub const ECHO_PREFIX: &str = "You passed in";

/// Backend serving a fixed catalog.
#[derive(Debug, Default)]
pub struct FixtureBackend {
    integrations: Vec<Integration>,
    connections: Vec<Connection>,
    actions: Vec<Action>,
    page_size: Option<usize>,
    failing_integrations: HashSet<String>,
    fail_connections: bool,
    runs: Mutex<Vec<(ActionInstanceSelector, Value)>>,
    connection_queries: Mutex<Vec<ConnectionQuery>>,
}

impl FixtureBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Two connected integrations: Google Calendar with `create_event` and
    /// Gmail with `send_email`. Connections reference their integration by
    /// id and key only.
    pub fn sample() -> Self {
        let calendar = integration("google-calendar", "Google Calendar");
        let gmail = integration("gmail", "Gmail");

        Self::new()
            .with_action(message_action("create_event", "Create Event", &calendar))
            .with_action(message_action("send_email", "Send Email", &gmail))
            .with_connection(partial_connection("1", &calendar))
            .with_connection(partial_connection("2", &gmail))
            .with_integration(calendar)
            .with_integration(gmail)
    }

    /// Add an integration (resolvable through `get_integration`).
    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integrations.push(integration);
        self
    }

    /// Add a connection.
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Add an action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Serve listings in pages of `size` items.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Make action listing fail for one integration id.
    pub fn with_failing_integration(mut self, integration_id: impl Into<String>) -> Self {
        self.failing_integrations.insert(integration_id.into());
        self
    }

    /// Make connection listing fail.
    pub fn with_failing_connections(mut self) -> Self {
        self.fail_connections = true;
        self
    }

    /// Action runs received so far.
    pub fn runs(&self) -> Vec<(ActionInstanceSelector, Value)> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Connection queries received so far.
    pub fn connection_queries(&self) -> Vec<ConnectionQuery> {
        self.connection_queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    fn paginate<T: Clone>(&self, items: Vec<T>, cursor: Option<&str>) -> Result<Page<T>, BackendError> {
        let Some(size) = self.page_size else {
            return Ok(Page::last(items));
        };

        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| BackendError::InvalidResponse(format!("bad cursor '{}'", c)))?,
            None => 0,
        };
        let end = (offset + size).min(items.len());
        let page = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        let cursor = (end < items.len()).then(|| end.to_string());

        Ok(Page { items: page, cursor })
    }
}

#[async_trait]
impl ActionsBackend for FixtureBackend {
    async fn find_connections(
        &self,
        query: &ConnectionQuery,
    ) -> Result<Page<Connection>, BackendError> {
        if let Ok(mut queries) = self.connection_queries.lock() {
            queries.push(query.clone());
        }
        if self.fail_connections {
            return Err(BackendError::ApiError {
                status: 500,
                message: "connections unavailable".to_string(),
            });
        }

        let matching = self
            .connections
            .iter()
            .filter(|c| match &query.integration_key {
                Some(key) => c
                    .integration
                    .as_ref()
                    .and_then(|i| i.key.as_deref())
                    .is_some_and(|k| k == key),
                None => true,
            })
            .cloned()
            .collect();

        self.paginate(matching, query.cursor.as_deref())
    }

    async fn find_actions(&self, query: &ActionQuery) -> Result<Page<Action>, BackendError> {
        if self.failing_integrations.contains(&query.integration_id) {
            return Err(BackendError::ApiError {
                status: 502,
                message: format!("actions of {} unavailable", query.integration_id),
            });
        }

        let matching = self
            .actions
            .iter()
            .filter(|a| {
                a.integration
                    .as_ref()
                    .is_some_and(|i| i.id == query.integration_id)
            })
            .cloned()
            .collect();

        self.paginate(matching, query.cursor.as_deref())
    }

    async fn get_integration(&self, id: &str) -> Result<Integration, BackendError> {
        self.integrations
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| BackendError::IntegrationNotFound(id.to_string()))
    }

    async fn run_action(
        &self,
        selector: &ActionInstanceSelector,
        input: Value,
    ) -> Result<ActionRunResult, BackendError> {
        let echoed = serde_json::to_string(&input)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        if let Ok(mut runs) = self.runs.lock() {
            runs.push((selector.clone(), input));
        }

        Ok(ActionRunResult {
            output: Some(Value::String(format!("{}{}", ECHO_PREFIX, echoed))),
        })
    }
}

/// Hands out one shared [`FixtureBackend`] regardless of credential.
#[derive(Clone)]
pub struct FixtureBackendFactory {
    backend: Arc<FixtureBackend>,
}

impl FixtureBackendFactory {
    /// Create a factory serving `backend`.
    pub fn new(backend: FixtureBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// The shared backend.
    pub fn backend(&self) -> Arc<FixtureBackend> {
        Arc::clone(&self.backend)
    }
}

impl BackendFactory for FixtureBackendFactory {
    fn for_credential(&self, _token: &str) -> Result<Arc<dyn ActionsBackend>, BackendError> {
        Ok(self.backend.clone())
    }
}

/// A complete integration whose id equals its key.
pub fn integration(key: &str, name: &str) -> Integration {
    Integration {
        id: key.to_string(),
        key: Some(key.to_string()),
        name: Some(name.to_string()),
    }
}

/// An action taking a single optional `message` string.
pub fn message_action(key: &str, name: &str, integration: &Integration) -> Action {
    Action {
        id: Some(format!("{}-{}", integration.id, key)),
        key: key.to_string(),
        name: name.to_string(),
        input_schema: Some(json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": name}
            }
        })),
        integration: Some(integration.clone()),
    }
}

fn partial_connection(id: &str, integration: &Integration) -> Connection {
    Connection {
        id: id.to_string(),
        name: None,
        integration: Some(Integration {
            id: integration.id.clone(),
            key: integration.key.clone(),
            name: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_filters_connections_by_key() {
        let backend = FixtureBackend::sample();
        let page = backend
            .find_connections(&ConnectionQuery {
                integration_key: Some("gmail".to_string()),
                cursor: None,
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "2");
        assert_eq!(backend.connection_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_pages_with_cursor() {
        let gmail = integration("gmail", "Gmail");
        let mut backend = FixtureBackend::new().with_page_size(2);
        for i in 0..5 {
            backend = backend.with_action(message_action(&format!("a{}", i), "A", &gmail));
        }

        let first = backend
            .find_actions(&ActionQuery {
                integration_id: "gmail".to_string(),
                cursor: None,
            })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("2"));

        let last = backend
            .find_actions(&ActionQuery {
                integration_id: "gmail".to_string(),
                cursor: Some("4".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(last.cursor.is_none());
    }

    #[tokio::test]
    async fn test_run_echoes_input() {
        let backend = FixtureBackend::sample();
        let selector = ActionInstanceSelector {
            auto_create: true,
            integration_key: "gmail".to_string(),
            parent_key: "send_email".to_string(),
        };
        let result = backend
            .run_action(&selector, json!({"message": "Hello"}))
            .await
            .unwrap();

        assert_eq!(
            result.output,
            Some(json!("You passed in{\"message\":\"Hello\"}"))
        );
        assert_eq!(backend.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_integration() {
        let backend = FixtureBackend::sample();
        assert!(matches!(
            backend.get_integration("nope").await,
            Err(BackendError::IntegrationNotFound(_))
        ));
    }
}
