//! Session tools
//!
//! This module turns an action catalog into the tools of one session:
//! - `action`: one tool per backend action
//! - `dynamic`: the `enable-tools` meta-tool and the session's working set

pub mod action;
pub mod dynamic;

pub use action::{register_action_tool, tool_name, ActionTool, RegisteredActionTool};
pub use dynamic::{DynamicToolSet, EnableToolsTool, ToolMode, ENABLE_TOOLS_NAME};

use crate::clients::{Action, ActionsBackend};
use crate::server::{McpServer, McpServerResult};
use std::sync::Arc;
use tracing::info;

/// Tools registered for one session.
pub struct SessionTools {
    /// Names of the registered action tools, in catalog order
    pub names: Vec<String>,

    /// Working set, when the session is in dynamic mode
    pub dynamic: Option<Arc<DynamicToolSet>>,
}

/// Register one tool per catalog action on `server`.
///
/// In dynamic mode the action tools are registered hidden and `enable-tools`
/// is added. Actions that cannot be named, and name collisions, are skipped.
pub async fn register_catalog_tools(
    server: &Arc<McpServer>,
    actions: &[Action],
    backend: Arc<dyn ActionsBackend>,
    mode: ToolMode,
) -> McpServerResult<SessionTools> {
    let enabled = mode == ToolMode::Static;
    let mut names = Vec::with_capacity(actions.len());

    for action in actions {
        if let Some(registered) =
            register_action_tool(server, action, Arc::clone(&backend), enabled).await
        {
            names.push(registered.name);
        }
    }

    let dynamic = match mode {
        ToolMode::Dynamic => Some(dynamic::install_dynamic_mode(server).await?),
        ToolMode::Static => None,
    };

    info!(
        tools = names.len(),
        skipped = actions.len() - names.len(),
        mode = %mode,
        "Registered catalog tools"
    );

    Ok(SessionTools { names, dynamic })
}
