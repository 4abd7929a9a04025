//! Bearer credential extraction
//!
//! A credential may arrive either as an `Authorization: Bearer <token>` header
//! or as a `token` query parameter. The query parameter wins when both are
//! present, since SSE clients in browsers cannot set headers.

use crate::error::{AuthError, AuthResult};

/// Pick the bearer credential from the query parameter or the header value.
///
/// The header must use the `Bearer` scheme; any other scheme counts as absent.
pub fn extract_bearer<'a>(
    authorization: Option<&'a str>,
    query_token: Option<&'a str>,
) -> AuthResult<&'a str> {
    let query_token = query_token.map(str::trim).filter(|t| !t.is_empty());
    let header_token = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    query_token
        .or(header_token)
        .ok_or(AuthError::MissingCredential)
}
