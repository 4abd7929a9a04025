use actions_auth::AuthError;
use actions_mcp::{McpError, McpResponse, RequestId, SessionError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Reply for GET and DELETE on `/mcp` without a session id.
pub const INVALID_SESSION_ID: &str = "Invalid or missing session ID";

/// Reply for legacy posts naming an unknown session.
pub const NO_TRANSPORT: &str = "No transport found for sessionId";

/// Errors returned by the gateway routes.
#[derive(Debug)]
pub enum AppError {
    /// Missing or rejected credential (401, or 500 for server-side failures)
    Unauthorized(AuthError),

    /// JSON-RPC error body with an explicit status
    Rpc { status: StatusCode, error: McpError },

    /// Plain-text 400
    BadRequest(&'static str),

    /// Anything else (500)
    Internal(String),
}

impl AppError {
    /// Map a session failure on the streamable transport.
    pub fn streamable(err: SessionError) -> Self {
        let status = match err {
            SessionError::MissingSessionId => StatusCode::BAD_REQUEST,
            SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::Rpc {
            status,
            error: err.rpc_error(),
        }
    }

    /// Map a session failure on the legacy transport.
    pub fn legacy(err: SessionError) -> Self {
        match err {
            SessionError::MissingSessionId
            | SessionError::SessionNotFound(_)
            | SessionError::TransportClosed(_) => AppError::BadRequest(NO_TRANSPORT),
            other => AppError::Internal(other.to_string()),
        }
    }

    /// Body that is not valid JSON.
    pub fn parse_error() -> Self {
        AppError::Rpc {
            status: StatusCode::BAD_REQUEST,
            error: McpError::parse_error(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized(err) => {
                let status = StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if err.is_server_error() {
                    tracing::error!(error = %err, "Credential handling failed");
                    return (status, Json(json!({ "error": err.to_string() }))).into_response();
                }

                let message = if matches!(err, AuthError::MissingCredential) {
                    err.to_string()
                } else {
                    format!("Unauthorized: {}", err)
                };
                (status, Json(json!({ "error": message }))).into_response()
            }
            AppError::Rpc { status, error } => {
                if status.is_server_error() {
                    tracing::error!(code = error.code, message = %error.message, "Request failed");
                }
                let body = McpResponse::error(RequestId::Null, error).to_value();
                (status, Json(body)).into_response()
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            AppError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
