use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use actions_auth::CallerIdentity;
use axum::extract::{Query, Request};
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tower::{Layer, Service, ServiceExt};

use super::cors::SESSION_HEADER;

const URL_LIMIT: usize = 100;
const URL_KEEP: usize = 50;
const CREDENTIAL_PARAM: &str = "token";
const REDACTED: &str = "***";

/// JSON-RPC method of the request body, set by the MCP routes on their
/// response so the access log can report it without reading the body.
#[derive(Debug, Clone)]
pub struct RpcMethod(pub String);

#[derive(Debug, Default, Deserialize)]
struct LogQuery {
    mode: Option<String>,
}

/// Tower Layer writing one access log line per request.
///
/// Runs inside the caller injection middleware, so the user id is read from
/// request extensions.
#[derive(Clone, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);

        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().to_string();
            let url = truncate_url(&redact_uri(req.uri()));
            let user_id = req
                .extensions()
                .get::<CallerIdentity>()
                .map(|c| c.user_id.clone());
            let request_session = header_value(req.headers(), SESSION_HEADER);
            let mode = Query::<LogQuery>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(q)| q.mode);

            let response = ready.oneshot(req).await.into_response();

            let session_id = request_session.or_else(|| header_value(response.headers(), SESSION_HEADER));
            let rpc_method = response.extensions().get::<RpcMethod>().map(|m| m.0.clone());

            tracing::info!(
                method = %method,
                url = %url,
                status = response.status().as_u16(),
                latency_ms = start.elapsed().as_millis() as u64,
                user_id = user_id.as_deref().unwrap_or("-"),
                session_id = session_id.as_deref().unwrap_or("-"),
                rpc_method = rpc_method.as_deref().unwrap_or("-"),
                mode = mode.as_deref().unwrap_or("-"),
                "request"
            );

            Ok(response)
        })
    }
}

fn header_value(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Path and query of a request with the `token` credential masked.
pub fn redact_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };

    let query: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == CREDENTIAL_PARAM => format!("{}={}", key, REDACTED),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", uri.path(), query.join("&"))
}

/// Shorten long URLs to their first 50 characters.
pub fn truncate_url(url: &str) -> String {
    if url.chars().count() > URL_LIMIT {
        let head: String = url.chars().take(URL_KEEP).collect();
        format!("{}...", head)
    } else {
        url.to_string()
    }
}
