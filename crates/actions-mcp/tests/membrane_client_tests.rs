//! HTTP tests for the Membrane backend client.
//!
//! A wiremock server stands in for the backend API. The tests check the
//! request shapes (paths, query parameters, bearer credential), pagination
//! through the catalog fetcher, retry of transient read failures, and that
//! action runs are never retried.

use actions_mcp::catalog::{list_actions, list_connections, CatalogFilter};
use actions_mcp::clients::{
    ActionInstanceSelector, ActionsBackend, BackendConfig, BackendError, ConnectionQuery,
    MembraneClient,
};
use actions_mcp::RetryConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "caller-token";

/// Test fixture providing a mock backend.
struct TestFixture {
    /// Mock backend server.
    server: MockServer,
    /// Backend configuration pointing at the mock.
    config: BackendConfig,
}

impl TestFixture {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let mut config = BackendConfig::new(server.uri());
        config.timeout_secs = 5;
        config.verify_tls = false;
        Self { server, config }
    }

    /// Client with near-instant retries.
    fn client(&self) -> MembraneClient {
        MembraneClient::new(self.config.clone(), TOKEN)
            .expect("client")
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                exponential_base: 2.0,
            })
    }
}

fn action_json(index: usize) -> serde_json::Value {
    json!({
        "id": format!("action-{}", index),
        "key": format!("action_{}", index),
        "name": format!("Action {}", index),
        "inputSchema": {"type": "object", "properties": {"message": {"type": "string"}}},
        "integration": {"id": "int-hubspot", "key": "hubspot", "name": "HubSpot"}
    })
}

fn page(range: std::ops::Range<usize>, cursor: Option<&str>) -> serde_json::Value {
    let items: Vec<_> = range.map(action_json).collect();
    match cursor {
        Some(cursor) => json!({"items": items, "cursor": cursor}),
        None => json!({"items": items}),
    }
}

#[tokio::test]
async fn test_find_connections_sends_credential_and_filter() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .and(query_param("integrationKey", "gmail"))
        .and(header("Authorization", "Bearer caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "conn-1", "name": "Work mail", "integration": "int-gmail"}]
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let page = fixture
        .client()
        .find_connections(&ConnectionQuery {
            integration_key: Some("gmail".to_string()),
            cursor: None,
        })
        .await
        .expect("connections");

    assert_eq!(page.items.len(), 1);
    let integration = page.items[0].integration.as_ref().unwrap();
    assert_eq!(integration.id, "int-gmail");
    assert!(integration.key.is_none());
    assert!(page.cursor.is_none());
}

#[tokio::test]
async fn test_catalog_follows_action_cursors() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "conn-1",
                "integration": {"id": "int-hubspot", "key": "hubspot", "name": "HubSpot"}
            }]
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    // Cursor-specific pages are mounted first so they win over the first page.
    Mock::given(method("GET"))
        .and(path("/actions"))
        .and(query_param("cursor", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(10..20, Some("page-3"))))
        .expect(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actions"))
        .and(query_param("cursor", "page-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(20..25, None)))
        .expect(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actions"))
        .and(query_param("integrationId", "int-hubspot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..10, Some("page-2"))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let client = fixture.client();
    let actions = list_actions(&client, &CatalogFilter::All)
        .await
        .expect("catalog");

    assert_eq!(actions.len(), 25);
    let mut keys: Vec<_> = actions.iter().map(|a| a.key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 25);
}

#[tokio::test]
async fn test_incomplete_integration_is_resolved() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "conn-1", "integration": "int-gmail"}]
        })))
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/integrations/int-gmail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "int-gmail", "key": "gmail", "name": "Gmail"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actions"))
        .and(query_param("integrationId", "int-gmail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"key": "send_email", "name": "Send Email"}]
        })))
        .mount(&fixture.server)
        .await;

    let client = fixture.client();
    let actions = list_actions(&client, &CatalogFilter::All).await.unwrap();

    assert_eq!(actions.len(), 1);
    let integration = actions[0].integration.as_ref().unwrap();
    assert_eq!(integration.key.as_deref(), Some("gmail"));
    assert_eq!(integration.name.as_deref(), Some("Gmail"));
}

#[tokio::test]
async fn test_apps_filter_fetches_each_app_once() {
    let fixture = TestFixture::new().await;

    for app in ["gmail", "slack"] {
        Mock::given(method("GET"))
            .and(path("/connections"))
            .and(query_param("integrationKey", app))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": format!("conn-{}", app),
                           "integration": {"id": app, "key": app, "name": app}}],
                "cursor": "ignored"
            })))
            .expect(1)
            .mount(&fixture.server)
            .await;
    }

    let client = fixture.client();
    let filter = CatalogFilter::Apps(vec!["gmail".to_string(), "slack".to_string()]);
    let connections = list_connections(&client, &filter).await.unwrap();

    assert_eq!(connections.len(), 2);
}

#[tokio::test]
async fn test_transient_read_failure_is_retried() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let page = fixture
        .client()
        .find_connections(&ConnectionQuery::default())
        .await
        .expect("retried");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_connection_listing_failure_is_fatal() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let client = fixture.client();
    let err = list_actions(&client, &CatalogFilter::All).await.unwrap_err();
    assert!(matches!(err, BackendError::ApiError { status: 400, .. }));
}

#[tokio::test]
async fn test_rejected_credential() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let err = fixture
        .client()
        .find_connections(&ConnectionQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::AuthenticationFailed));
}

#[tokio::test]
async fn test_missing_integration() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/integrations/nope"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let err = fixture.client().get_integration("nope").await.unwrap_err();
    assert!(matches!(err, BackendError::IntegrationNotFound(id) if id == "nope"));
}

#[tokio::test]
async fn test_integration_id_stays_one_path_segment() {
    let fixture = TestFixture::new().await;

    Mock::given(method("GET"))
        .and(path("/integrations/team%2Fgmail%3Fx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "team/gmail?x", "key": "gmail"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let integration = fixture
        .client()
        .get_integration("team/gmail?x")
        .await
        .expect("integration");
    assert_eq!(integration.id, "team/gmail?x");
    assert_eq!(integration.key.as_deref(), Some("gmail"));
}

#[tokio::test]
async fn test_run_action_posts_input() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/action-instances/run"))
        .and(query_param("autoCreate", "true"))
        .and(query_param("integrationKey", "gmail"))
        .and(query_param("parentKey", "send_email"))
        .and(header("Authorization", "Bearer caller-token"))
        .and(body_json(json!({"message": "Hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"messageId": "m-1"}
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let selector = ActionInstanceSelector {
        auto_create: true,
        integration_key: "gmail".to_string(),
        parent_key: "send_email".to_string(),
    };
    let result = fixture
        .client()
        .run_action(&selector, json!({"message": "Hello"}))
        .await
        .expect("run");

    assert_eq!(result.output, Some(json!({"messageId": "m-1"})));
}

#[tokio::test]
async fn test_run_action_is_not_retried() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/action-instances/run"))
        .respond_with(ResponseTemplate::new(503).set_body_string("provider unavailable"))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let selector = ActionInstanceSelector {
        auto_create: true,
        integration_key: "gmail".to_string(),
        parent_key: "send_email".to_string(),
    };
    let err = fixture
        .client()
        .run_action(&selector, json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::ActionFailed(message) if message == "provider unavailable"));
}
