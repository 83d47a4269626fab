use super::{
    ToolContext, optional_bool_argument, optional_string_argument, relative_display,
    required_string_argument, timestamp_now,
};
use crate::errors::ToolError;
use kiln_buildstate::{BuildState, BuildStateError};
use serde_json::{Value, json};
use tracing::{info, warn};

pub(super) fn get(ctx: &ToolContext) -> Result<Value, ToolError> {
    match ctx.store.get()? {
        Some(state) => {
            serde_json::to_value(state).map_err(|error| ToolError::Execution(error.to_string()))
        }
        None => Ok(Value::Null),
    }
}

pub(super) fn begin(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let build_id = required_string_argument(args, "build_id")?;
    let first_phase = required_string_argument(args, "first_phase")?;
    if let Some(existing) = ctx.store.get()? {
        return Err(BuildStateError::AlreadyActive(existing.build_id).into());
    }

    let mut state = BuildState::new(build_id, first_phase, Some(timestamp_now()));
    state.design_document = optional_string_argument(args, "design_document")?;
    ctx.store.save(&state)?;
    ctx.lock.acquire(&state.phase_label())?;
    info!(build_id = %state.build_id, "build started");

    Ok(json!({
        "started": true,
        "build_id": state.build_id,
        "phase": state.phase_label(),
        "checkpoint": relative_display(&ctx.project_root, ctx.store.path()),
    }))
}

pub(super) fn save(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let raw = args
        .get("state")
        .cloned()
        .ok_or_else(|| ToolError::InvalidArguments("missing required argument 'state'".to_string()))?;
    let state: BuildState = serde_json::from_value(raw).map_err(|error| {
        ToolError::InvalidArguments(format!("state is not a valid build state: {error}"))
    })?;

    ctx.store.save(&state)?;
    ctx.lock.acquire(&state.phase_label())?;
    Ok(json!({
        "saved": true,
        "build_id": state.build_id,
        "phase": state.phase_label(),
        "completed_phases": state.completed_phases.len(),
        "unresolved_errors": state.unresolved_errors(),
    }))
}

pub(super) fn record_quality_score(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let gate = required_string_argument(args, "gate")?;
    let passed = optional_bool_argument(args, "passed")?
        .ok_or_else(|| ToolError::InvalidArguments("missing required argument 'passed'".to_string()))?;
    let score = args.get("score").and_then(Value::as_f64);
    let notes = optional_string_argument(args, "notes")?;

    let mut state = ctx.store.get()?.ok_or(BuildStateError::NotFound)?;
    let recorded = state.record_quality_score(gate, passed, score, notes).clone();
    ctx.store.save(&state)?;

    Ok(json!({
        "recorded": recorded,
        "phase": state.phase_label(),
        "gates": state.current_phase.gates,
    }))
}

pub(super) fn finish(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let outcome = required_string_argument(args, "outcome")?;
    let build_id = match ctx.store.get() {
        Ok(state) => state.map(|state| state.build_id),
        Err(error) => {
            warn!(%error, "unreadable checkpoint will be removed");
            None
        }
    };

    let removed_checkpoint = ctx.store.clear()?;
    let released_lock = ctx.lock.release()?;
    if !removed_checkpoint && !released_lock {
        return Err(BuildStateError::NotFound.into());
    }
    info!(?build_id, outcome = %outcome, "build finished");

    Ok(json!({
        "finished": true,
        "outcome": outcome,
        "build_id": build_id,
        "removed_checkpoint": removed_checkpoint,
        "released_lock": released_lock,
    }))
}
