//! JWT credential decoding
//!
//! This module decodes caller credentials using the jsonwebtoken crate.
//! When a shared secret is configured the signature is verified (HMAC
//! algorithms); otherwise the token is only decoded, and the actions backend
//! remains the authority that accepts or rejects it.

use crate::claims::{CallerClaims, CallerIdentity};
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};

/// JWT configuration for credential decoding.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC verification. `None` disables signature checks.
    pub secret: Option<String>,

    /// Algorithm to verify against
    pub algorithm: JwtAlgorithm,

    /// Clock skew tolerance in seconds for `exp`
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: JwtAlgorithm::HS256,
            leeway_secs: 60,
        }
    }
}

/// Supported JWT algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// JWT service for credential operations.
pub struct JwtService {
    config: JwtConfig,
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.config.algorithm)
            .field("verifies_signature", &self.verifies_signature())
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the given configuration.
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        let (encoding_key, decoding_key) = match config.secret.as_deref() {
            Some("") => {
                return Err(AuthError::ConfigError("JWT secret must not be empty".to_string()))
            }
            Some(secret) => (
                Some(EncodingKey::from_secret(secret.as_bytes())),
                DecodingKey::from_secret(secret.as_bytes()),
            ),
            None => (None, DecodingKey::from_secret(&[])),
        };

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create a verifying service with a shared secret (HS256).
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(JwtConfig {
            secret: Some(secret.into()),
            ..Default::default()
        })
    }

    /// Create a service that decodes credentials without verifying signatures.
    pub fn decode_only() -> Self {
        Self {
            config: JwtConfig::default(),
            encoding_key: None,
            decoding_key: DecodingKey::from_secret(&[]),
        }
    }

    /// Whether signatures are checked.
    pub fn verifies_signature(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Decode a credential into claims.
    ///
    /// Expired credentials are rejected in both modes.
    pub fn decode_claims(&self, token: &str) -> AuthResult<CallerClaims> {
        let mut validation = Validation::new(self.config.algorithm.into());
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        validation.leeway = self.config.leeway_secs;
        if !self.verifies_signature() {
            validation.insecure_disable_signature_validation();
        }

        let token_data: TokenData<CallerClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AuthError::InvalidToken("Malformed token".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("Invalid signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidToken("Invalid algorithm".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Decode a credential and extract the caller identity.
    pub fn authenticate(&self, token: &str) -> AuthResult<CallerIdentity> {
        let claims = self.decode_claims(token)?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| AuthError::MissingClaim("id".to_string()))?
            .to_string();

        debug!(user_id = %user_id, "Credential decoded");

        Ok(CallerIdentity {
            user_id,
            token: token.to_string(),
        })
    }

    /// Encode claims into a signed token. Requires a configured secret.
    pub fn encode_claims(&self, claims: &CallerClaims) -> AuthResult<String> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| AuthError::ConfigError("Secret required for encoding".to_string()))?;
        let header = Header::new(self.config.algorithm.into());
        encode(&header, claims, key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Get the configuration.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}
