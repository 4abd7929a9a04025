//! JWT claims carried by caller credentials
//!
//! Credentials are minted by the actions backend (or by the embedding
//! application on its behalf). The gateway only needs the caller identity out
//! of them; every other claim is kept opaque and the raw token is forwarded to
//! the backend unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Claims decoded from a caller credential.
///
/// The identity is read from `id`, falling back to the standard `sub` claim.
///
/// # Example
///
/// ```rust
/// use actions_auth::claims::CallerClaims;
///
/// let claims = CallerClaims::with_id("user-123");
/// assert_eq!(claims.user_id(), Some("user-123"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerClaims {
    /// Caller identifier issued by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Subject (RFC 7519)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Any other claim, kept for logging and forwarding
    #[serde(default, flatten)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl CallerClaims {
    /// Create claims carrying only an `id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Set the expiration relative to now.
    pub fn expires_in(mut self, duration: chrono::Duration) -> Self {
        let now = Utc::now();
        self.iat = Some(now.timestamp());
        self.exp = Some((now + duration).timestamp());
        self
    }

    /// The caller identity, if any identity claim is present and non-empty.
    pub fn user_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.sub.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Check if the token is expired. Tokens without `exp` never expire.
    pub fn is_expired(&self) -> bool {
        self.exp
            .map(|exp| Utc::now().timestamp() >= exp)
            .unwrap_or(false)
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// An authenticated caller: the identity plus the credential it came from.
///
/// The credential is forwarded opaquely to the actions backend as its
/// access token.
#[derive(Clone)]
pub struct CallerIdentity {
    /// Caller identifier
    pub user_id: String,

    /// Raw bearer credential
    pub token: String,
}

impl std::fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerIdentity")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
