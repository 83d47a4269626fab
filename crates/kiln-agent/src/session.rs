use crate::augment::augment_result;
use crate::config::SessionConfig;
use crate::errors::ToolError;
use crate::protocol::{ToolCall, ToolResponse};
use crate::stall_guard::{SessionGuardState, StallGuard};
use crate::tools::{
    ToolContext, ToolDefinition, ToolKind, execute, normalize_arguments, validate_tool_arguments,
};
use kiln_bridge::EditorBridge;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// One agent session. Calls are handled strictly one at a time through `&mut self`.
pub struct ToolSession {
    context: ToolContext,
    guard: StallGuard,
}

impl ToolSession {
    pub fn new(config: SessionConfig, bridge: Arc<dyn EditorBridge>) -> Self {
        Self {
            context: ToolContext::new(config.project_root, bridge),
            guard: StallGuard::new(config.stall),
        }
    }

    pub fn guard_state(&self) -> &SessionGuardState {
        self.guard.snapshot()
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = ToolKind::ALL.into_iter().map(ToolKind::definition).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub async fn call(&mut self, call: ToolCall) -> ToolResponse {
        match self.dispatch(&call).await {
            Ok(payload) => ToolResponse::success(&payload),
            Err(error) => {
                if error.is_caller_mistake() {
                    debug!(tool = %call.name, %error, "tool call rejected");
                } else {
                    warn!(tool = %call.name, %error, "tool call failed");
                }
                ToolResponse::failure(error.to_string())
            }
        }
    }

    /// Validates, executes, observes and augments one call. Failures leave the guard untouched.
    pub async fn dispatch(&mut self, call: &ToolCall) -> Result<Value, ToolError> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let arguments = normalize_arguments(&call.arguments);
        validate_tool_arguments(&kind.parameters(), &arguments)?;

        debug!(tool = kind.name(), "dispatching tool call");
        let payload = execute(kind, &arguments, &self.context).await?;
        let stall = self.guard.observe(kind);
        Ok(augment_result(kind, payload, stall.as_ref(), self.context.bridge.as_ref()).await)
    }
}
