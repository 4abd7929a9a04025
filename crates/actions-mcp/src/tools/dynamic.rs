//! Dynamic tool mode.
//!
//! In dynamic mode every catalog tool starts hidden and the session exposes
//! a single `enable-tools` tool. Each call to it replaces the session's set
//! of visible tools with the requested one.

use crate::schema::{FieldType, ObjectShape};
use crate::server::{McpServer, McpServerError, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Name of the meta-tool.
pub const ENABLE_TOOLS_NAME: &str = "enable-tools";

/// Confirmation returned by `enable-tools`.
pub const TOOLS_ENABLED: &str = "Tools enabled";

/// How a session exposes its catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolMode {
    /// Every catalog tool is visible.
    #[default]
    Static,

    /// Catalog tools are hidden behind `enable-tools`.
    Dynamic,
}

impl ToolMode {
    /// Parse the `mode` query parameter. Anything but `dynamic` is static.
    pub fn from_query(mode: Option<&str>) -> Self {
        match mode.map(str::trim) {
            Some(mode) if mode.eq_ignore_ascii_case("dynamic") => ToolMode::Dynamic,
            _ => ToolMode::Static,
        }
    }

    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolMode::Static => "static",
            ToolMode::Dynamic => "dynamic",
        }
    }
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The enabled-tools working set of one session.
pub struct DynamicToolSet {
    server: Weak<McpServer>,
    enabled: Mutex<Vec<String>>,
}

impl DynamicToolSet {
    /// Create an empty working set for `server`.
    pub fn new(server: &Arc<McpServer>) -> Self {
        Self {
            server: Arc::downgrade(server),
            enabled: Mutex::new(Vec::new()),
        }
    }

    /// Replace the visible tools with `requested`.
    ///
    /// Names without a registered tool are ignored, as is the meta-tool's
    /// own name. Returns the new working set.
    pub async fn enable(&self, requested: &[String]) -> McpServerResult<Vec<String>> {
        let server = self
            .server
            .upgrade()
            .ok_or_else(|| McpServerError::Internal("session is closed".to_string()))?;

        let requested: Vec<String> = requested
            .iter()
            .filter(|name| name.as_str() != ENABLE_TOOLS_NAME)
            .cloned()
            .collect();

        let shown = {
            let mut enabled = self.enabled.lock().await;
            let shown = server.replace_enabled(&enabled, &requested).await;
            *enabled = shown.clone();
            shown
        };

        server.notify_tools_changed().await;
        Ok(shown)
    }

    /// Current working set, in the order it was requested.
    pub async fn enabled(&self) -> Vec<String> {
        self.enabled.lock().await.clone()
    }
}

#[derive(Debug, Deserialize)]
struct EnableToolsArgs {
    tools: Vec<String>,
}

/// The `enable-tools` meta-tool.
pub struct EnableToolsTool {
    set: Arc<DynamicToolSet>,
    shape: ObjectShape,
}

impl EnableToolsTool {
    /// Create the meta-tool over `set`.
    pub fn new(set: Arc<DynamicToolSet>) -> Self {
        Self {
            set,
            shape: ObjectShape::default().with_field(
                "tools",
                FieldType::Array(Box::new(FieldType::String)),
                false,
            ),
        }
    }
}

#[async_trait]
impl Tool for EnableToolsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ENABLE_TOOLS_NAME,
            "Enable the listed tools by name. Tools enabled by an earlier call are \
             disabled first; unknown names are ignored.",
        )
        .with_title("Enable tools")
        .with_schema(self.shape.to_json_schema())
    }

    fn input_shape(&self) -> Option<&ObjectShape> {
        Some(&self.shape)
    }

    #[instrument(skip(self, args, context), fields(session_id = ?context.session_id))]
    async fn execute(&self, args: Value, context: &ToolContext) -> McpServerResult<ToolResult> {
        let args: EnableToolsArgs = serde_json::from_value(args)
            .map_err(|e| McpServerError::InvalidParams(e.to_string()))?;

        let enabled = self.set.enable(&args.tools).await?;
        info!(
            requested = args.tools.len(),
            enabled = enabled.len(),
            "Replaced enabled tools"
        );

        Ok(ToolResult::text(TOOLS_ENABLED))
    }
}

/// Put `server` into dynamic mode: register `enable-tools` and return the
/// session's working set.
pub async fn install_dynamic_mode(server: &Arc<McpServer>) -> McpServerResult<Arc<DynamicToolSet>> {
    let set = Arc::new(DynamicToolSet::new(server));
    server
        .register_tool(Arc::new(EnableToolsTool::new(set.clone())))
        .await?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.0, self.0)
        }

        async fn execute(&self, _args: Value, _context: &ToolContext) -> McpServerResult<ToolResult> {
            Ok(ToolResult::text(self.0))
        }
    }

    async fn dynamic_server() -> (Arc<McpServer>, Arc<DynamicToolSet>) {
        let server = Arc::new(McpServer::integration_app());
        for name in ["gmail_send_email", "google-calendar_create_event"] {
            server
                .register_disabled_tool(Arc::new(Named(name)))
                .await
                .unwrap();
        }
        let set = install_dynamic_mode(&server).await.unwrap();
        (server, set)
    }

    struct Numbered(String);

    #[async_trait]
    impl Tool for Numbered {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.0.clone(), self.0.clone())
        }

        async fn execute(&self, _args: Value, _context: &ToolContext) -> McpServerResult<ToolResult> {
            Ok(ToolResult::text(self.0.clone()))
        }
    }

    async fn visible(server: &McpServer) -> Vec<String> {
        server.list_tools().await.into_iter().map(|t| t.name).collect()
    }

    #[test]
    fn test_mode_from_query() {
        assert_eq!(ToolMode::from_query(None), ToolMode::Static);
        assert_eq!(ToolMode::from_query(Some("static")), ToolMode::Static);
        assert_eq!(ToolMode::from_query(Some("Dynamic")), ToolMode::Dynamic);
        assert_eq!(ToolMode::from_query(Some("bogus")), ToolMode::Static);
    }

    #[tokio::test]
    async fn test_fresh_session_lists_only_meta_tool() {
        let (server, _set) = dynamic_server().await;
        assert_eq!(visible(&server).await, vec![ENABLE_TOOLS_NAME]);
    }

    #[tokio::test]
    async fn test_enable_replaces_previous_set() {
        let (server, set) = dynamic_server().await;

        set.enable(&["gmail_send_email".to_string()]).await.unwrap();
        assert_eq!(visible(&server).await, vec![ENABLE_TOOLS_NAME, "gmail_send_email"]);

        set.enable(&["google-calendar_create_event".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(
            visible(&server).await,
            vec![ENABLE_TOOLS_NAME, "google-calendar_create_event"]
        );
        assert_eq!(set.enabled().await, vec!["google-calendar_create_event"]);
    }

    #[tokio::test]
    async fn test_meta_tool_cannot_disable_itself() {
        let (server, set) = dynamic_server().await;

        set.enable(&[ENABLE_TOOLS_NAME.to_string()]).await.unwrap();
        set.enable(&[]).await.unwrap();
        assert_eq!(visible(&server).await, vec![ENABLE_TOOLS_NAME]);
    }

    #[tokio::test]
    async fn test_meta_tool_call_returns_confirmation() {
        let (server, _set) = dynamic_server().await;
        let mut stream = server.open_stream().await;

        let result = server
            .call_tool(
                ENABLE_TOOLS_NAME,
                Some(json!({"tools": ["gmail_send_email", "nope"]})),
                &ToolContext::empty(),
            )
            .await
            .unwrap();

        assert_eq!(result.first_text(), Some(TOOLS_ENABLED));
        assert!(server.is_enabled("gmail_send_email").await);
        let notification = stream.recv().await.unwrap();
        assert_eq!(notification["method"], "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn test_meta_tool_requires_tool_list() {
        let (server, _set) = dynamic_server().await;
        let err = server
            .call_tool(ENABLE_TOOLS_NAME, Some(json!({})), &ToolContext::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, McpServerError::InvalidParams(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enables_leave_one_set() {
        let server = Arc::new(McpServer::integration_app());
        for i in 0..20 {
            server
                .register_disabled_tool(Arc::new(Numbered(format!("t{}", i))))
                .await
                .unwrap();
        }
        let set = install_dynamic_mode(&server).await.unwrap();

        let first: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        let second: Vec<String> = (10..20).map(|i| format!("t{}", i)).collect();
        let mut expect_first = first.clone();
        expect_first.sort();
        let mut expect_second = second.clone();
        expect_second.sort();

        for _ in 0..100 {
            let a = {
                let set = Arc::clone(&set);
                let tools = first.clone();
                tokio::spawn(async move { set.enable(&tools).await })
            };
            let b = {
                let set = Arc::clone(&set);
                let tools = second.clone();
                tokio::spawn(async move { set.enable(&tools).await })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let mut shown: Vec<String> = visible(&server)
                .await
                .into_iter()
                .filter(|name| name != ENABLE_TOOLS_NAME)
                .collect();
            shown.sort();
            assert!(
                shown == expect_first || shown == expect_second,
                "mixed working set: {:?}",
                shown
            );

            let mut recorded = set.enabled().await;
            recorded.sort();
            assert_eq!(recorded, shown);
        }
    }
}
