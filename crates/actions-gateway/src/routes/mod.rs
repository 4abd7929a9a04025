pub mod health;
pub mod mcp;
pub mod sse;

use axum::http::HeaderMap;
use axum::response::sse::Event;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;

/// Chat the session belongs to.
pub const CHAT_HEADER: &str = "x-chat-id";

/// Query parameters selecting how a new session builds its tools.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    /// Comma-separated integration keys
    pub apps: Option<String>,

    /// Single integration key
    pub integration_key: Option<String>,

    /// `dynamic` for the enable-tools flow
    pub mode: Option<String>,
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// JSON-RPC method(s) of a body, for the access log.
pub(crate) fn rpc_method(body: &Value) -> Option<String> {
    match body {
        Value::Object(message) => message.get("method")?.as_str().map(str::to_string),
        Value::Array(messages) => {
            let methods: Vec<&str> = messages
                .iter()
                .filter_map(|m| m.get("method").and_then(Value::as_str))
                .collect();
            (!methods.is_empty()).then(|| methods.join(","))
        }
        _ => None,
    }
}

/// Server-to-client message as an SSE event.
pub(crate) fn message_event(message: Value) -> Result<Event, Infallible> {
    Ok(Event::default().event("message").data(message.to_string()))
}
