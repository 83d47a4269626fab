use crate::errors::best_effort;
use crate::stall_guard::StallReport;
use crate::tools::ToolKind;
use kiln_bridge::EditorBridge;
use serde_json::{Map, Value, json};

pub const DOCK_REMINDER: &str = "Keep the editor dock current: call log_progress with a one-line \
summary of what you just did, and update_phase whenever the phase or a gate changes.";

pub fn error_directive(error_count: usize) -> String {
    format!(
        "The editor reports {error_count} error(s). Call get_errors and fix every error before \
         writing more files or completing the current phase."
    )
}

/// Decorates a successful tool payload with the live error count, stall payload and dock reminder.
///
/// The error-count query is skipped for exempt tools and silently dropped when the editor is
/// unreachable, so the field is either current or absent.
pub async fn augment_result(
    kind: ToolKind,
    payload: Value,
    stall: Option<&StallReport>,
    bridge: &dyn EditorBridge,
) -> Value {
    let mut fields = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };

    if !kind.skips_error_check() {
        if let Some(report) = best_effort("error count", bridge.errors().await) {
            let count = report.error_count();
            fields.insert("error_count".to_string(), json!(count));
            if count > 0 {
                fields.insert(
                    "action_required".to_string(),
                    Value::String(error_directive(count)),
                );
            }
        }
    }

    if let Some(report) = stall {
        if let Ok(value) = serde_json::to_value(report) {
            fields.insert("stall_guard".to_string(), value);
        }
    }

    if kind.wants_dock_reminder() {
        fields.insert(
            "dock_reminder".to_string(),
            Value::String(DOCK_REMINDER.to_string()),
        );
    }

    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bridge::{ErrorEntry, ErrorReport, MockEditor};

    #[tokio::test(flavor = "current_thread")]
    async fn scalar_payload_is_wrapped_before_fields_are_added() {
        let editor = MockEditor::online();
        let augmented = augment_result(ToolKind::ReadProjectFile, json!("text"), None, &editor).await;
        assert_eq!(augmented["result"], "text");
        assert_eq!(augmented["error_count"], 0);
        assert!(augmented.get("action_required").is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn errors_add_action_required_and_overwrite_existing_value() {
        let editor = MockEditor::online();
        editor.set_errors(ErrorReport {
            errors: vec![ErrorEntry::new("Parse error").at("res://player.gd", 3)],
            warnings: Vec::new(),
        });
        let augmented = augment_result(
            ToolKind::WriteScript,
            json!({ "path": "player.gd", "action_required": "stale" }),
            None,
            &editor,
        )
        .await;
        assert_eq!(augmented["error_count"], 1);
        assert_eq!(augmented["action_required"], error_directive(1));
        assert_eq!(augmented["dock_reminder"], DOCK_REMINDER);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_editor_omits_error_count() {
        let editor = MockEditor::offline();
        let augmented = augment_result(ToolKind::SceneTree, json!({}), None, &editor).await;
        assert!(augmented.get("error_count").is_none());
        assert_eq!(editor.call_count("errors"), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exempt_tools_skip_the_error_query() {
        let editor = MockEditor::online();
        let augmented = augment_result(ToolKind::LogProgress, json!({}), None, &editor).await;
        assert_eq!(editor.call_count("errors"), 0);
        assert!(augmented.get("error_count").is_none());
        assert!(augmented.get("dock_reminder").is_none());
    }
}
