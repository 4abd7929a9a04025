//! Action tools.
//!
//! Each catalog action becomes one tool named `<integrationKey>_<actionKey>`.
//! Running the tool runs an auto-created instance of the action on the
//! caller's backend.

use crate::clients::{Action, ActionInstanceSelector, ActionsBackend};
use crate::schema::{translate_schema, ObjectShape};
use crate::server::{McpServer, McpServerError, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Longest tool name handed to clients. Clients prefix tool names with the
/// server name and commonly cap the result at 64 characters.
pub const MAX_TOOL_NAME_LENGTH: usize = 50;

/// Hex digits of the name digest kept when a name is shortened.
const NAME_HASH_LENGTH: usize = 8;

/// Text returned when an action produced no output.
pub const NO_OUTPUT: &str = "No output";

/// Derive the tool name of an action.
///
/// Names longer than [`MAX_TOOL_NAME_LENGTH`] characters keep their first 41
/// characters followed by `_` and 8 hex digits of the SHA-256 of the full
/// name, so shortened names of different actions stay distinct.
pub fn tool_name(integration_key: &str, action_key: &str) -> String {
    let full = format!("{}_{}", integration_key, action_key);
    if full.chars().count() <= MAX_TOOL_NAME_LENGTH {
        return full;
    }

    let digest = Sha256::digest(full.as_bytes());
    let hash: String = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(NAME_HASH_LENGTH)
        .collect();
    let prefix: String = full
        .chars()
        .take(MAX_TOOL_NAME_LENGTH - NAME_HASH_LENGTH - 1)
        .collect();

    format!("{}_{}", prefix, hash)
}

/// Lowercase slug: runs of non-alphanumeric characters become a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// A tool that runs one backend action.
pub struct ActionTool {
    definition: ToolDefinition,
    shape: ObjectShape,
    selector: ActionInstanceSelector,
    backend: Arc<dyn ActionsBackend>,
}

impl ActionTool {
    /// Build the tool for `action`.
    ///
    /// Returns `None` when the action's integration has neither a key nor a
    /// name to derive the tool name from.
    pub fn from_action(action: &Action, backend: Arc<dyn ActionsBackend>) -> Option<Self> {
        let integration = action.integration.as_ref();
        let key = integration
            .and_then(|i| i.key.as_deref())
            .filter(|k| !k.is_empty());
        let display = integration
            .and_then(|i| i.name.as_deref())
            .filter(|n| !n.is_empty());

        let (integration_key, integration_name) = match (key, display) {
            (Some(key), Some(name)) => (key.to_string(), name.to_string()),
            (Some(key), None) => (key.to_string(), key.to_string()),
            (None, Some(name)) => (slugify(name), name.to_string()),
            (None, None) => return None,
        };
        if integration_key.is_empty() {
            return None;
        }

        let name = tool_name(&integration_key, &action.key);
        let description = format!("{}: {}", integration_name, action.name);
        let shape = action
            .input_schema
            .as_ref()
            .map(translate_schema)
            .unwrap_or_default();

        let definition = ToolDefinition::new(name, description.clone())
            .with_title(description)
            .with_schema(shape.to_json_schema());

        Some(Self {
            definition,
            shape,
            selector: ActionInstanceSelector {
                auto_create: true,
                integration_key,
                parent_key: action.key.clone(),
            },
            backend,
        })
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Instance the tool runs.
    pub fn selector(&self) -> &ActionInstanceSelector {
        &self.selector
    }
}

#[async_trait]
impl Tool for ActionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn input_shape(&self) -> Option<&ObjectShape> {
        Some(&self.shape)
    }

    #[instrument(skip(self, args, context), fields(tool = %self.definition.name, session_id = ?context.session_id))]
    async fn execute(&self, args: Value, context: &ToolContext) -> McpServerResult<ToolResult> {
        let result = self
            .backend
            .run_action(&self.selector, args)
            .await
            .map_err(|e| McpServerError::ExecutionError(e.to_string()))?;

        match result.output {
            Some(output) if is_truthy(&output) => {
                let text = serde_json::to_string(&output)
                    .map_err(|e| McpServerError::Internal(e.to_string()))?;
                Ok(ToolResult::text(text))
            }
            _ => Ok(ToolResult::text(NO_OUTPUT)),
        }
    }
}

/// JSON values that count as output. Empty strings, zero, `false` and
/// `null` do not.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A tool registered on a session server.
pub struct RegisteredActionTool {
    /// Final tool name
    pub name: String,

    /// The tool itself
    pub tool: Arc<ActionTool>,
}

/// Register the tool of `action` on `server`.
///
/// Returns `None` when the action cannot be named or when a tool of the same
/// name is already registered (the first registration is kept).
pub async fn register_action_tool(
    server: &McpServer,
    action: &Action,
    backend: Arc<dyn ActionsBackend>,
    enabled: bool,
) -> Option<RegisteredActionTool> {
    let Some(tool) = ActionTool::from_action(action, backend) else {
        debug!(action_key = %action.key, "Action has no integration key or name, skipping");
        return None;
    };

    let tool = Arc::new(tool);
    let name = tool.name().to_string();
    let registered = if enabled {
        server.register_tool(tool.clone()).await
    } else {
        server.register_disabled_tool(tool.clone()).await
    };

    match registered {
        Ok(()) => Some(RegisteredActionTool { name, tool }),
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool name collision, keeping the first registration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fixture::{integration, message_action, FixtureBackend};
    use crate::clients::Integration;
    use serde_json::json;

    fn backend() -> Arc<dyn ActionsBackend> {
        Arc::new(FixtureBackend::sample())
    }

    #[test]
    fn test_short_names_are_kept() {
        assert_eq!(tool_name("gmail", "send_email"), "gmail_send_email");
    }

    #[test]
    fn test_long_names_are_shortened_with_hash() {
        let key = "a".repeat(40);
        let first = tool_name(&key, "create_very_long_record_one");
        let second = tool_name(&key, "create_very_long_record_two");

        assert_eq!(first.chars().count(), MAX_TOOL_NAME_LENGTH);
        assert_eq!(second.chars().count(), MAX_TOOL_NAME_LENGTH);
        assert_eq!(first[..41], second[..41]);
        assert_ne!(first, second);
        assert_eq!(&first[41..42], "_");
        assert_eq!(tool_name(&key, "create_very_long_record_one"), first);
    }

    #[test]
    fn test_exactly_max_length_is_untouched() {
        let action_key = "b".repeat(MAX_TOOL_NAME_LENGTH - 6);
        let name = tool_name("gmail", &action_key);
        assert_eq!(name, format!("gmail_{}", action_key));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Google Calendar"), "google-calendar");
        assert_eq!(slugify("  HubSpot (CRM) "), "hubspot-crm");
    }

    #[test]
    fn test_description_and_schema() {
        let gmail = integration("gmail", "Gmail");
        let tool = ActionTool::from_action(&message_action("send_email", "Send Email", &gmail), backend())
            .unwrap();
        let definition = tool.definition();

        assert_eq!(definition.name, "gmail_send_email");
        assert_eq!(definition.description, "Gmail: Send Email");
        assert_eq!(definition.title.as_deref(), Some("Gmail: Send Email"));
        assert_eq!(definition.input_schema["properties"]["message"]["type"], "string");
    }

    #[test]
    fn test_key_and_name_fallbacks() {
        let mut action = message_action("send_email", "Send Email", &integration("x", "X"));

        action.integration = Some(Integration {
            id: "1".to_string(),
            key: None,
            name: Some("Google Mail".to_string()),
        });
        let tool = ActionTool::from_action(&action, backend()).unwrap();
        assert_eq!(tool.name(), "google-mail_send_email");

        action.integration = Some(Integration {
            id: "1".to_string(),
            key: Some("gmail".to_string()),
            name: None,
        });
        let tool = ActionTool::from_action(&action, backend()).unwrap();
        assert_eq!(tool.definition().description, "gmail: Send Email");

        action.integration = Some(Integration {
            id: "1".to_string(),
            key: None,
            name: None,
        });
        assert!(ActionTool::from_action(&action, backend()).is_none());

        action.integration = None;
        assert!(ActionTool::from_action(&action, backend()).is_none());
    }

    #[test]
    fn test_missing_schema_is_empty_object() {
        let mut action = message_action("ping", "Ping", &integration("gmail", "Gmail"));
        action.input_schema = None;
        let tool = ActionTool::from_action(&action, backend()).unwrap();
        assert_eq!(
            tool.definition().input_schema,
            json!({"type": "object", "properties": {}})
        );
    }

    #[tokio::test]
    async fn test_execute_runs_action_instance() {
        let fixture = Arc::new(FixtureBackend::sample());
        let gmail = integration("gmail", "Gmail");
        let tool = ActionTool::from_action(
            &message_action("send_email", "Send Email", &gmail),
            fixture.clone(),
        )
        .unwrap();

        let result = tool
            .execute(json!({"message": "Hello"}), &ToolContext::empty())
            .await
            .unwrap();

        let expected = serde_json::to_string("You passed in{\"message\":\"Hello\"}").unwrap();
        assert_eq!(result.first_text(), Some(expected.as_str()));

        let runs = fixture.runs();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].0.auto_create);
        assert_eq!(runs[0].0.integration_key, "gmail");
        assert_eq!(runs[0].0.parent_key, "send_email");
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!("ok")));
    }

    #[tokio::test]
    async fn test_register_collision_keeps_first() {
        let server = McpServer::integration_app();
        let gmail = integration("gmail", "Gmail");
        let action = message_action("send_email", "Send Email", &gmail);

        let first = register_action_tool(&server, &action, backend(), true).await;
        let second = register_action_tool(&server, &action, backend(), true).await;

        assert_eq!(first.unwrap().name, "gmail_send_email");
        assert!(second.is_none());
        assert_eq!(server.tool_count().await, 1);
    }
}
