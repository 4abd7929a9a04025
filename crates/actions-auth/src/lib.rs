//! # Actions Auth
//!
//! Credential handling for the actions MCP gateway.
//!
//! ## Overview
//!
//! Every MCP endpoint requires a bearer credential. This crate:
//! - **Extracts** it from the `Authorization` header or the `token` query parameter
//! - **Decodes** it as a JWT to find the caller identity (`id`, falling back to `sub`)
//! - **Verifies** the signature when a shared secret is configured
//!
//! The credential itself is forwarded untouched to the actions backend, which
//! remains the authority on what the caller may do.
//!
//! ## Features
//!
//! - `jwt` (default): JWT decoding using jsonwebtoken
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actions_auth::{extract_bearer, JwtService};
//!
//! let service = JwtService::decode_only();
//! let token = extract_bearer(Some("Bearer eyJhbGciOi..."), None).unwrap();
//! let caller = service.authenticate(token).unwrap();
//! println!("caller {}", caller.user_id);
//! ```

pub mod claims;
pub mod credential;
pub mod error;
#[cfg(feature = "jwt")]
pub mod jwt;

// Re-export main types
pub use claims::{CallerClaims, CallerIdentity};
pub use credential::extract_bearer;
pub use error::{AuthError, AuthResult};

#[cfg(feature = "jwt")]
pub use jwt::{JwtAlgorithm, JwtConfig, JwtService};
