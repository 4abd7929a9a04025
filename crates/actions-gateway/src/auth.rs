use actions_auth::{extract_bearer, AuthResult, CallerIdentity, JwtService};
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct CredentialQuery {
    token: Option<String>,
}

/// Authenticate a request from its `Authorization` header or `token` query
/// parameter.
pub fn authenticate(jwt: &JwtService, headers: &HeaderMap, uri: &Uri) -> AuthResult<CallerIdentity> {
    let query = Query::<CredentialQuery>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let token = extract_bearer(header, query.token.as_deref())?;
    jwt.authenticate(token)
}

/// Middleware that attaches the caller identity to requests carrying a
/// valid credential. Requests without one pass through untouched; the
/// [`Caller`] extractor rejects them on routes that need a caller.
pub async fn inject_caller(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Ok(caller) = authenticate(&state.jwt, req.headers(), req.uri()) {
        req.extensions_mut().insert(caller);
    }
    next.run(req).await
}

/// The authenticated caller of an MCP route.
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Fast path: the middleware already decoded the credential
        if let Some(caller) = parts.extensions.get::<CallerIdentity>() {
            return Ok(Caller(caller.clone()));
        }

        match authenticate(&state.jwt, &parts.headers, &parts.uri) {
            Ok(caller) => Ok(Caller(caller)),
            Err(err) => {
                tracing::debug!(error = %err, path = %parts.uri.path(), "Rejected credential");
                Err(AppError::Unauthorized(err))
            }
        }
    }
}
