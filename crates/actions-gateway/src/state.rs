use actions_auth::JwtService;
use actions_mcp::SessionManager;
use std::sync::Arc;

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(sessions: SessionManager, jwt: JwtService) -> Self {
        Self {
            sessions,
            jwt: Arc::new(jwt),
        }
    }
}
