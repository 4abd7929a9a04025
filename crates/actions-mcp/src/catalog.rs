//! Action catalog fetching.
//!
//! Collects the caller's connections and then every action of each connected
//! integration, following cursors until the backend stops returning one.
//! A failure listing connections is fatal; a failure for one connection only
//! drops that connection's actions.

use crate::clients::{
    Action, ActionQuery, ActionsBackend, BackendError, Connection, ConnectionQuery, Integration,
    Page,
};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, info, instrument, warn};

/// Which connections the catalog covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CatalogFilter {
    /// Every connection of the caller.
    #[default]
    All,

    /// Connections of a single integration key.
    Integration(String),

    /// Connections of any of the listed app (integration) keys.
    Apps(Vec<String>),
}

impl CatalogFilter {
    /// Build a filter from the `apps` (comma separated) and `integrationKey`
    /// query parameters. `apps` wins when both are present.
    pub fn from_query(apps: Option<&str>, integration_key: Option<&str>) -> Self {
        if let Some(apps) = apps {
            let keys: Vec<String> = apps
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            if !keys.is_empty() {
                return CatalogFilter::Apps(keys);
            }
        }

        match integration_key.map(str::trim) {
            Some(key) if !key.is_empty() => CatalogFilter::Integration(key.to_string()),
            _ => CatalogFilter::All,
        }
    }
}

/// Drain a cursor-paginated listing.
///
/// Stops when a page carries no cursor (or an empty one). A cursor that was
/// already followed ends the sweep with a warning instead of looping forever.
pub async fn fetch_all_with_pagination<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, BackendError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, BackendError>>,
{
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = fetch(cursor.take()).await?;
        items.extend(page.items);

        match page.cursor.filter(|c| !c.is_empty()) {
            Some(next) if !seen.insert(next.clone()) => {
                warn!(cursor = %next, "Backend repeated a page cursor, stopping pagination");
                break;
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(items)
}

/// List the caller's connections under `filter`.
///
/// The app-list filter issues one single-page request per app concurrently
/// and does not follow cursors; the other filters paginate fully.
#[instrument(skip(backend))]
pub async fn list_connections(
    backend: &dyn ActionsBackend,
    filter: &CatalogFilter,
) -> Result<Vec<Connection>, BackendError> {
    match filter {
        CatalogFilter::Apps(apps) => {
            let pages = try_join_all(apps.iter().map(|app| {
                let query = ConnectionQuery {
                    integration_key: Some(app.clone()),
                    cursor: None,
                };
                async move { backend.find_connections(&query).await }
            }))
            .await?;
            Ok(pages.into_iter().flat_map(|page| page.items).collect())
        }
        CatalogFilter::Integration(key) => {
            fetch_all_with_pagination(|cursor| {
                let query = ConnectionQuery {
                    integration_key: Some(key.clone()),
                    cursor,
                };
                async move { backend.find_connections(&query).await }
            })
            .await
        }
        CatalogFilter::All => {
            fetch_all_with_pagination(|cursor| {
                let query = ConnectionQuery {
                    integration_key: None,
                    cursor,
                };
                async move { backend.find_connections(&query).await }
            })
            .await
        }
    }
}

/// List every action of one integration.
pub async fn list_integration_actions(
    backend: &dyn ActionsBackend,
    integration_id: &str,
) -> Result<Vec<Action>, BackendError> {
    fetch_all_with_pagination(|cursor| {
        let query = ActionQuery {
            integration_id: integration_id.to_string(),
            cursor,
        };
        async move { backend.find_actions(&query).await }
    })
    .await
}

/// Build the caller's action catalog.
///
/// Connections are processed one after another. Connections without an
/// integration, whose integration cannot be resolved, or whose actions fail
/// to list are skipped. Every returned action carries its integration.
#[instrument(skip(backend))]
pub async fn list_actions(
    backend: &dyn ActionsBackend,
    filter: &CatalogFilter,
) -> Result<Vec<Action>, BackendError> {
    let connections = list_connections(backend, filter).await?;
    debug!(count = connections.len(), "Fetched connections");

    let mut actions = Vec::new();

    for connection in connections {
        let Some(integration) = connection.integration.clone() else {
            debug!(connection_id = %connection.id, "Connection has no integration, skipping");
            continue;
        };

        let integration = match resolve_integration(backend, integration).await {
            Ok(integration) => integration,
            Err(e) => {
                warn!(
                    connection_id = %connection.id,
                    error = %e,
                    "Could not resolve integration of connection, skipping"
                );
                continue;
            }
        };

        match list_integration_actions(backend, &integration.id).await {
            Ok(found) => {
                actions.extend(found.into_iter().map(|mut action| {
                    if action.integration.is_none() {
                        action.integration = Some(integration.clone());
                    }
                    action
                }));
            }
            Err(e) => {
                warn!(
                    connection_id = %connection.id,
                    integration_id = %integration.id,
                    error = %e,
                    "Error processing connection, skipping its actions"
                );
            }
        }
    }

    info!(count = actions.len(), "Built action catalog");
    Ok(actions)
}

async fn resolve_integration(
    backend: &dyn ActionsBackend,
    integration: Integration,
) -> Result<Integration, BackendError> {
    if integration.is_complete() {
        return Ok(integration);
    }

    let fetched = backend.get_integration(&integration.id).await?;
    Ok(Integration {
        id: integration.id,
        key: integration.key.or(fetched.key),
        name: integration.name.or(fetched.name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fixture::{integration, message_action, FixtureBackend};

    #[test]
    fn test_filter_from_query() {
        assert_eq!(CatalogFilter::from_query(None, None), CatalogFilter::All);
        assert_eq!(
            CatalogFilter::from_query(Some("gmail, slack,,"), None),
            CatalogFilter::Apps(vec!["gmail".to_string(), "slack".to_string()])
        );
        assert_eq!(
            CatalogFilter::from_query(Some(" , "), Some("gmail")),
            CatalogFilter::Integration("gmail".to_string())
        );
        assert_eq!(
            CatalogFilter::from_query(Some("hubspot"), Some("gmail")),
            CatalogFilter::Apps(vec!["hubspot".to_string()])
        );
    }

    #[tokio::test]
    async fn test_pagination_stops_on_repeated_cursor() {
        let mut calls = 0;
        let items = fetch_all_with_pagination(|_cursor| {
            calls += 1;
            async {
                Ok(Page {
                    items: vec![1],
                    cursor: Some("same".to_string()),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 1]);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_sample_catalog_resolves_integrations() {
        let backend = FixtureBackend::sample();
        let actions = list_actions(&backend, &CatalogFilter::All).await.unwrap();

        assert_eq!(actions.len(), 2);
        for action in &actions {
            assert!(action.integration.as_ref().unwrap().is_complete());
        }
    }

    /// Lists one gmail connection whose actions carry no integration.
    struct OrphanActions;

    #[async_trait::async_trait]
    impl ActionsBackend for OrphanActions {
        async fn find_connections(
            &self,
            _query: &ConnectionQuery,
        ) -> Result<Page<Connection>, BackendError> {
            Ok(Page::last(vec![Connection {
                id: "c1".to_string(),
                name: None,
                integration: Some(integration("gmail", "Gmail")),
            }]))
        }

        async fn find_actions(&self, _query: &ActionQuery) -> Result<Page<Action>, BackendError> {
            let mut action = message_action("send_email", "Send Email", &integration("x", "X"));
            action.integration = None;
            Ok(Page::last(vec![action]))
        }

        async fn get_integration(&self, id: &str) -> Result<Integration, BackendError> {
            Err(BackendError::IntegrationNotFound(id.to_string()))
        }

        async fn run_action(
            &self,
            _selector: &crate::clients::ActionInstanceSelector,
            _input: serde_json::Value,
        ) -> Result<crate::clients::ActionRunResult, BackendError> {
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn test_actions_inherit_connection_integration() {
        let actions = list_actions(&OrphanActions, &CatalogFilter::All).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].integration, Some(integration("gmail", "Gmail")));
    }

    #[tokio::test]
    async fn test_unresolvable_integration_is_skipped() {
        let backend = FixtureBackend::new().with_connection(Connection {
            id: "c1".to_string(),
            name: None,
            integration: Some(Integration {
                id: "ghost".to_string(),
                ..Default::default()
            }),
        });
        let actions = list_actions(&backend, &CatalogFilter::All).await.unwrap();
        assert!(actions.is_empty());
    }
}
