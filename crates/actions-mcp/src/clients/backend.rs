//! Actions backend interface.
//!
//! The backend lists the caller's connections, the actions each connected
//! integration offers, and runs actions on the caller's behalf. Everything
//! here is read-only input to the tool catalog except [`ActionsBackend::run_action`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Backend client errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Integration not found.
    #[error("Integration not found: {0}")]
    IntegrationNotFound(String),

    /// Authentication failed (the caller credential was rejected).
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Action run failed inside the backend.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// The request URL could not be built from the configured base.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::RequestFailed(e) => e.is_timeout() || e.is_connect(),
            BackendError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A third-party app type, e.g. a calendar provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Integration id
    pub id: String,

    /// Integration key, e.g. `google-calendar`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Display name, e.g. `Google Calendar`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Integration {
    /// Whether both key and name are known.
    pub fn is_complete(&self) -> bool {
        self.key.as_deref().is_some_and(|k| !k.is_empty())
            && self.name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// Connections may reference their integration by id only.
#[derive(Deserialize)]
#[serde(untagged)]
enum IntegrationRef {
    Id(String),
    Full(Integration),
}

fn deserialize_integration_ref<'de, D>(deserializer: D) -> Result<Option<Integration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let reference: Option<IntegrationRef> = Option::deserialize(deserializer)?;
    Ok(reference.map(|r| match r {
        IntegrationRef::Id(id) => Integration {
            id,
            ..Default::default()
        },
        IntegrationRef::Full(integration) => integration,
    }))
}

/// A link between the caller's account and one integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connection id
    pub id: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The connected integration
    #[serde(
        default,
        deserialize_with = "deserialize_integration_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub integration: Option<Integration>,
}

/// A remote-callable operation of an integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Action id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Key, unique within its integration
    pub key: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// JSON Schema of the action input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Owning integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,
}

/// One page of a cursor-paginated listing. No cursor means no more pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// Cursor of the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    /// A last page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
        }
    }
}

/// Query for `connections.find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionQuery {
    /// Restrict to one integration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_key: Option<String>,

    /// Page cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Query for `actions.find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionQuery {
    /// Integration whose actions to list
    pub integration_id: String,

    /// Page cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Selects (and, with `auto_create`, provisions) the action instance to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInstanceSelector {
    /// Create the instance if it does not exist yet
    pub auto_create: bool,

    /// Integration key
    pub integration_key: String,

    /// Key of the parent action
    pub parent_key: String,
}

/// Result of running an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRunResult {
    /// Action output, if any
    #[serde(default)]
    pub output: Option<Value>,
}

/// Client for the remote actions backend, scoped to one caller credential.
#[async_trait]
pub trait ActionsBackend: Send + Sync {
    /// List one page of connections.
    async fn find_connections(
        &self,
        query: &ConnectionQuery,
    ) -> Result<Page<Connection>, BackendError>;

    /// List one page of actions of an integration.
    async fn find_actions(&self, query: &ActionQuery) -> Result<Page<Action>, BackendError>;

    /// Fetch integration details.
    async fn get_integration(&self, id: &str) -> Result<Integration, BackendError>;

    /// Run an action instance with the given input.
    async fn run_action(
        &self,
        selector: &ActionInstanceSelector,
        input: Value,
    ) -> Result<ActionRunResult, BackendError>;
}

/// Builds a backend client for a caller credential.
pub trait BackendFactory: Send + Sync {
    /// Create a backend client that authenticates with `token`.
    fn for_credential(&self, token: &str) -> Result<Arc<dyn ActionsBackend>, BackendError>;
}
