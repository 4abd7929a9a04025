//! Actions backend clients.
//!
//! This module provides the backend interface and its implementations:
//! - [`MembraneClient`]: HTTP client for the hosted integration backend
//! - [`FixtureBackend`]: in-memory catalog for local runs and tests
//!
//! Sessions never construct clients directly; they go through a
//! [`BackendFactory`] so each session gets a client scoped to its caller.

pub mod backend;
pub mod config;
pub mod fixture;
pub mod membrane;

pub use backend::{
    Action, ActionInstanceSelector, ActionQuery, ActionRunResult, ActionsBackend, BackendError,
    BackendFactory, Connection, ConnectionQuery, Integration, Page,
};
pub use config::{BackendConfig, ConfigError, DEFAULT_API_URI};
pub use fixture::{FixtureBackend, FixtureBackendFactory};
pub use membrane::{MembraneClient, MembraneClientFactory};
