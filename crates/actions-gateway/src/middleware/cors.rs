use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Session header clients read back from initialize responses.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Build the CORS layer.
///
/// - Origins: the given list, or any origin when empty
/// - Methods: GET, POST, DELETE, OPTIONS
/// - Headers: Authorization, Content-Type, mcp-session-id, x-chat-id
/// - Exposed: mcp-session-id
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static("x-chat-id"),
        ])
        .expose_headers([HeaderName::from_static(SESSION_HEADER)])
        .max_age(std::time::Duration::from_secs(3600))
}
