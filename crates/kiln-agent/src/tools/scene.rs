use super::{ToolContext, optional_object_argument, required_string_argument};
use crate::errors::ToolError;
use kiln_bridge::NodeSpec;
use serde_json::{Value, json};

pub(super) async fn add_node(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let spec = NodeSpec {
        parent_path: required_string_argument(args, "parent_path")?,
        node_type: required_string_argument(args, "node_type")?,
        node_name: required_string_argument(args, "node_name")?,
        properties: optional_object_argument(args, "properties")?.unwrap_or_default(),
    };
    if spec.node_name.is_empty() || spec.node_name.contains('/') {
        return Err(ToolError::InvalidArguments(
            "node_name must be a single non-empty path segment".to_string(),
        ));
    }
    ctx.bridge.add_node(&spec).await?;
    Ok(json!({
        "added": format!("{}/{}", spec.parent_path.trim_end_matches('/'), spec.node_name),
        "node_type": spec.node_type,
    }))
}

pub(super) async fn update_node(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let node_path = required_string_argument(args, "node_path")?;
    let properties = optional_object_argument(args, "properties")?.unwrap_or_default();
    ctx.bridge.update_node(&node_path, &properties).await?;
    let updated: Vec<&String> = properties.keys().collect();
    Ok(json!({ "updated": node_path, "properties": updated }))
}

pub(super) async fn delete_node(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let node_path = required_string_argument(args, "node_path")?;
    ctx.bridge.delete_node(&node_path).await?;
    Ok(json!({ "deleted": node_path }))
}
