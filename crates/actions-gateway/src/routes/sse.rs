//! Legacy HTTP+SSE transport.
//!
//! `GET /sse` opens a session whose first event names the endpoint for
//! client messages. Responses to those messages arrive on the event stream.
//! The session lives as long as the stream.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;

use actions_mcp::SessionOptions;

use super::{header_str, message_event, rpc_method, SessionQuery, CHAT_HEADER};
use crate::auth::Caller;
use crate::error::{AppError, NO_TRANSPORT};
use crate::middleware::access_log::RpcMethod;
use crate::state::AppState;

/// Path clients post messages to.
pub const MESSAGES_PATH: &str = "/sse/messages";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sse", get(open_session))
        .route(MESSAGES_PATH, post(post_message))
}

async fn open_session(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let options = SessionOptions::from_request(
        query.apps.as_deref(),
        query.integration_key.as_deref(),
        query.mode.as_deref(),
        header_str(&headers, CHAT_HEADER),
    );

    let (session, messages) = state
        .sessions
        .open_legacy(&caller, &options)
        .await
        .map_err(AppError::legacy)?;

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?sessionId={}", MESSAGES_PATH, session.id()));

    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) })
        .chain(messages.map(message_event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Answers `202` only after the message is handled, see
/// [`actions_mcp::SessionManager::handle_legacy_post`].
async fn post_message(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        tracing::debug!("Legacy message without sessionId");
        return AppError::BadRequest(NO_TRANSPORT).into_response();
    };

    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(_) => return AppError::parse_error().into_response(),
    };
    let method = rpc_method(&body);

    let mut response = match state
        .sessions
        .handle_legacy_post(&session_id, &caller, body)
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(err) => {
            tracing::debug!(session_id = %session_id, error = %err, "Legacy message rejected");
            AppError::legacy(err).into_response()
        }
    };

    if let Some(method) = method {
        response.extensions_mut().insert(RpcMethod(method));
    }
    response
}
