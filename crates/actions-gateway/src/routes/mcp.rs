//! Streamable HTTP transport (`/mcp`).
//!
//! - `POST` carries JSON-RPC messages. A body without `mcp-session-id` must be
//!   an `initialize` request and creates the session; the id comes back in
//!   the `mcp-session-id` response header.
//! - `GET` opens the server-to-client event stream of a session.
//! - `DELETE` terminates a session.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::convert::Infallible;

use actions_mcp::SessionOptions;

use super::{header_str, message_event, rpc_method, SessionQuery, CHAT_HEADER};
use crate::auth::Caller;
use crate::error::{AppError, INVALID_SESSION_ID};
use crate::middleware::access_log::RpcMethod;
use crate::middleware::cors::SESSION_HEADER;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/mcp",
        post(handle_post).get(open_stream).delete(terminate),
    )
}

async fn handle_post(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(_) => return AppError::parse_error().into_response(),
    };
    let method = rpc_method(&body);

    let options = SessionOptions::from_request(
        query.apps.as_deref(),
        query.integration_key.as_deref(),
        query.mode.as_deref(),
        header_str(&headers, CHAT_HEADER),
    );

    let mut response = match state
        .sessions
        .handle_streamable_post(header_str(&headers, SESSION_HEADER), &caller, &options, body)
        .await
    {
        Ok(reply) => {
            let mut response = match reply.responses {
                Some(responses) => Json(responses).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            };
            if let Ok(value) = HeaderValue::from_str(&reply.session_id) {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
            response
        }
        Err(err) => AppError::streamable(err).into_response(),
    };

    if let Some(method) = method {
        response.extensions_mut().insert(RpcMethod(method));
    }
    response
}

async fn open_stream(
    State(state): State<AppState>,
    Caller(caller): Caller,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id =
        header_str(&headers, SESSION_HEADER).ok_or(AppError::BadRequest(INVALID_SESSION_ID))?;

    let stream = state
        .sessions
        .open_streamable_stream(session_id, &caller)
        .await
        .map_err(AppError::streamable)?;

    Ok(Sse::new(stream.map(message_event)).keep_alive(KeepAlive::default()))
}

async fn terminate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id =
        header_str(&headers, SESSION_HEADER).ok_or(AppError::BadRequest(INVALID_SESSION_ID))?;

    state
        .sessions
        .terminate_streamable(session_id, &caller)
        .await
        .map_err(AppError::streamable)?;
    Ok(StatusCode::OK)
}
