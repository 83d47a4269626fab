use super::{
    ToolContext, io_error, optional_object_argument, optional_string_argument,
    optional_u64_argument, relative_display, required_string_argument,
};
use crate::errors::{ToolError, best_effort};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kiln_bridge::{PhaseProgress, PhaseStatus};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

pub(super) const DEFAULT_SCENE_DEPTH: u32 = 3;
pub(super) const MAX_SCENE_DEPTH: u32 = 10;
pub(super) const DEFAULT_SCREENSHOT_PATH: &str = ".kiln/screenshots/latest.png";

pub(super) async fn status(ctx: &ToolContext) -> Result<Value, ToolError> {
    match ctx.bridge.status().await {
        Ok(status) => Ok(json!({
            "connected": true,
            "project_name": status.project_name,
            "editor_version": status.editor_version,
            "is_playing": status.is_playing,
            "current_scene": status.current_scene,
        })),
        Err(error) => {
            debug!(%error, "editor status unavailable");
            Ok(json!({ "connected": false, "reason": error.to_string() }))
        }
    }
}

pub(super) async fn errors(ctx: &ToolContext) -> Result<Value, ToolError> {
    let report = ctx.bridge.errors().await?;
    Ok(json!({
        "error_total": report.error_count(),
        "warning_total": report.warnings.len(),
        "errors": report.errors,
        "warnings": report.warnings,
    }))
}

pub(super) async fn get_phase(ctx: &ToolContext) -> Result<Value, ToolError> {
    let phase = ctx.bridge.get_phase().await?;
    Ok(json!({ "phase": phase }))
}

pub(super) async fn log_progress(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let message = required_string_argument(args, "message")?;
    let logged = best_effort("log", ctx.bridge.log(&message).await).is_some();
    Ok(json!({ "logged": logged }))
}

pub(super) async fn update_phase(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let number = optional_u64_argument(args, "number")?
        .and_then(|number| u32::try_from(number).ok())
        .ok_or_else(|| ToolError::InvalidArguments("argument 'number' is out of range".to_string()))?;
    let name = required_string_argument(args, "name")?;
    let status = match optional_string_argument(args, "status")? {
        Some(raw) => PhaseStatus::try_from(raw.as_str()).map_err(ToolError::InvalidArguments)?,
        None => PhaseStatus::InProgress,
    };
    let mut gates = BTreeMap::new();
    for (gate, value) in optional_object_argument(args, "gates")?.unwrap_or_default() {
        let passed = value.as_bool().ok_or_else(|| {
            ToolError::InvalidArguments(format!("gate '{gate}' must be a boolean"))
        })?;
        gates.insert(gate, passed);
    }

    let phase = PhaseProgress {
        number,
        name,
        status,
        gates,
    };
    let accepted = best_effort("set phase", ctx.bridge.set_phase(&phase).await).is_some();
    Ok(json!({ "accepted": accepted, "phase": phase }))
}

pub(super) async fn scene_tree(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let root = optional_string_argument(args, "root")?;
    let depth = optional_u64_argument(args, "depth")?
        .map(|depth| depth.clamp(1, u64::from(MAX_SCENE_DEPTH)) as u32)
        .unwrap_or(DEFAULT_SCENE_DEPTH);
    let tree = ctx.bridge.scene_tree(root.as_deref(), depth).await?;
    Ok(json!({
        "depth": depth,
        "node_count": tree.node_count(),
        "tree": tree,
    }))
}

pub(super) async fn class_info(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let class_name = required_string_argument(args, "class_name")?;
    let info = ctx.bridge.class_info(&class_name).await?;
    serde_json::to_value(info).map_err(|error| ToolError::Execution(error.to_string()))
}

pub(super) async fn open_scripts(ctx: &ToolContext) -> Result<Value, ToolError> {
    let open = ctx.bridge.open_scripts().await?;
    Ok(json!({ "count": open.scripts.len(), "scripts": open.scripts }))
}

pub(super) async fn capture_screenshot(
    args: &Value,
    ctx: &ToolContext,
) -> Result<Value, ToolError> {
    let raw_path = optional_string_argument(args, "path")?
        .unwrap_or_else(|| DEFAULT_SCREENSHOT_PATH.to_string());
    let path = ctx.resolve(&raw_path)?;
    let shot = ctx.bridge.screenshot().await?;
    let bytes = STANDARD.decode(shot.png_base64.trim()).map_err(|error| {
        ToolError::Execution(format!("editor returned an undecodable screenshot: {error}"))
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| io_error("create", parent, error))?;
    }
    fs::write(&path, &bytes).map_err(|error| io_error("write", &path, error))?;
    Ok(json!({
        "path": relative_display(&ctx.project_root, &path),
        "width": shot.width,
        "height": shot.height,
        "bytes": bytes.len(),
    }))
}

pub(super) async fn rescan(ctx: &ToolContext) -> Result<Value, ToolError> {
    ctx.bridge.rescan().await?;
    Ok(json!({ "rescanned": true }))
}

pub(super) async fn run(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let scene = optional_string_argument(args, "scene")?;
    let ack = ctx.bridge.run(scene.as_deref()).await?;
    Ok(json!({ "running": true, "scene": scene, "message": ack.message }))
}

pub(super) async fn stop(ctx: &ToolContext) -> Result<Value, ToolError> {
    let ack = ctx.bridge.stop().await?;
    Ok(json!({ "stopped": true, "message": ack.message }))
}
