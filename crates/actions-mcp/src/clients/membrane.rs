//! Membrane actions backend client.
//!
//! HTTP client for the hosted integration backend. Every request carries the
//! caller's own credential, so one client is built per session.

use super::backend::{
    Action, ActionInstanceSelector, ActionQuery, ActionRunResult, ActionsBackend, BackendError,
    BackendFactory, Connection, ConnectionQuery, Integration, Page,
};
use super::config::BackendConfig;
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Membrane backend client scoped to one caller credential.
#[derive(Clone)]
pub struct MembraneClient {
    /// HTTP client instance.
    client: Client,

    /// Backend endpoint configuration.
    config: BackendConfig,

    /// Caller credential forwarded as the bearer token.
    token: String,

    /// Retry policy for reads.
    retry: RetryConfig,
}

impl MembraneClient {
    /// Create a new client for `token`.
    pub fn new(config: BackendConfig, token: impl Into<String>) -> Result<Self, BackendError> {
        let client = build_http_client(&config)?;
        Ok(Self::with_http_client(client, config, token))
    }

    /// Create a client sharing an existing connection pool.
    pub fn with_http_client(client: Client, config: BackendConfig, token: impl Into<String>) -> Self {
        let retry = config.retry();
        Self {
            client,
            config,
            token: token.into(),
            retry,
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, BackendError> {
        self.config
            .segment_url(segments)
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    /// GET with retries on transient failures.
    async fn get_json<T, Q>(&self, url: reqwest::Url, query: &Q) -> Result<T, BackendError>
    where
        T: for<'de> Deserialize<'de>,
        Q: serde::Serialize + ?Sized,
    {
        with_retry_if(
            &self.retry,
            || async {
                let response = self
                    .authorized(self.client.get(url.clone()).query(query))
                    .send()
                    .await?;
                self.handle_response(response).await
            },
            BackendError::is_transient,
        )
        .await
    }

    /// Handle API response and parse JSON.
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, BackendError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            error!(status = status.as_u16(), "Backend rejected the caller credential");
            return Err(BackendError::AuthenticationFailed);
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Backend API error ({}): {}", status.as_u16(), message);
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ActionsBackend for MembraneClient {
    #[instrument(skip(self), fields(integration_key = ?query.integration_key))]
    async fn find_connections(
        &self,
        query: &ConnectionQuery,
    ) -> Result<Page<Connection>, BackendError> {
        debug!("Listing connections");
        self.get_json(self.endpoint(&["connections"])?, query).await
    }

    #[instrument(skip(self), fields(integration_id = %query.integration_id))]
    async fn find_actions(&self, query: &ActionQuery) -> Result<Page<Action>, BackendError> {
        debug!("Listing actions for integration {}", query.integration_id);
        self.get_json(self.endpoint(&["actions"])?, query).await
    }

    #[instrument(skip(self))]
    async fn get_integration(&self, id: &str) -> Result<Integration, BackendError> {
        debug!("Fetching integration {}", id);

        let url = self.endpoint(&["integrations", id])?;
        match self.get_json::<Integration, [(&str, &str)]>(url, &[]).await
        {
            Err(BackendError::ApiError { status: 404, .. }) => {
                Err(BackendError::IntegrationNotFound(id.to_string()))
            }
            other => other,
        }
    }

    #[instrument(skip(self, input), fields(integration_key = %selector.integration_key, action_key = %selector.parent_key))]
    async fn run_action(
        &self,
        selector: &ActionInstanceSelector,
        input: Value,
    ) -> Result<ActionRunResult, BackendError> {
        debug!("Running action {}", selector.parent_key);

        let url = self.endpoint(&["action-instances", "run"])?;
        let request = self
            .authorized(self.client.post(url))
            .query(selector)
            .json(&input);

        let response = request.send().await?;
        match self.handle_response(response).await {
            Err(BackendError::ApiError { message, .. }) => Err(BackendError::ActionFailed(message)),
            other => other,
        }
    }
}

fn build_http_client(config: &BackendConfig) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(config.timeout())
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()
        .map_err(BackendError::RequestFailed)
}

/// Builds [`MembraneClient`]s that share one connection pool.
#[derive(Clone)]
pub struct MembraneClientFactory {
    client: Client,
    config: BackendConfig,
}

impl MembraneClientFactory {
    /// Create a factory for the given backend.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    /// Backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

impl BackendFactory for MembraneClientFactory {
    fn for_credential(&self, token: &str) -> Result<Arc<dyn ActionsBackend>, BackendError> {
        Ok(Arc::new(MembraneClient::with_http_client(
            self.client.clone(),
            self.config.clone(),
            token,
        )))
    }
}
