mod support;

use httpmock::prelude::*;
use kiln_agent::{DOCK_REMINDER, ToolCall, error_directive};
use kiln_bridge::{ErrorEntry, ErrorReport, HttpEditorBridge};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{Harness, session_with_bridge};
use tempfile::TempDir;

#[tokio::test(flavor = "current_thread")]
async fn fourth_informational_call_triggers_initial_limit() {
    let mut harness = Harness::online();
    for _ in 0..3 {
        let payload = harness.ok("scene_tree", json!({})).await;
        assert!(payload.get("stall_guard").is_none());
    }

    let fourth = harness.ok("open_scripts", json!({})).await;
    assert_eq!(fourth["stall_guard"]["triggered"], true);
    assert_eq!(fourth["stall_guard"]["limit"], 4);
    assert_eq!(fourth["stall_guard"]["streak"], 4);
    assert!(fourth["stall_guard"].get("last_progress_tool").is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn mutating_call_widens_limit_to_six() {
    let mut harness = Harness::online();
    harness
        .ok("write_script", json!({ "path": "player.gd", "content": "extends Node2D\n" }))
        .await;

    for call in 1..=5 {
        let payload = harness.ok("class_info", json!({ "class_name": "Sprite2D" })).await;
        assert!(
            payload.get("stall_guard").is_none(),
            "call {call} should not trigger"
        );
    }
    let sixth = harness.ok("class_info", json!({ "class_name": "Sprite2D" })).await;
    assert_eq!(sixth["stall_guard"]["triggered"], true);
    assert_eq!(sixth["stall_guard"]["limit"], 6);
    assert_eq!(sixth["stall_guard"]["last_progress_tool"], "write_script");
    assert_eq!(sixth["stall_guard"]["last_progress_call_index"], 1);
}

#[tokio::test(flavor = "current_thread")]
async fn directive_escalates_two_calls_past_the_limit() {
    let mut harness = Harness::online();
    for _ in 0..5 {
        harness.ok("list_project_files", json!({})).await;
    }
    let fifth = harness.session.guard_state().non_mutating_streak;
    assert_eq!(fifth, 5);

    let sixth = harness.ok("list_project_files", json!({})).await;
    assert_eq!(sixth["stall_guard"]["escalated"], true);
    assert_eq!(sixth["stall_guard"]["hard_limit"], 6);
    assert!(
        sixth["stall_guard"]["directive"]
            .as_str()
            .is_some_and(|directive| directive.starts_with("STOP PLANNING"))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn log_progress_neither_counts_nor_resets() {
    let mut harness = Harness::online();
    for _ in 0..3 {
        harness.ok("editor_status", json!({})).await;
    }
    let logged = harness
        .ok("log_progress", json!({ "message": "reading the scene" }))
        .await;
    assert_eq!(logged["logged"], true);
    assert!(logged.get("stall_guard").is_none());
    assert!(logged.get("dock_reminder").is_none());

    let state = harness.session.guard_state().clone();
    assert_eq!(state.non_mutating_streak, 3);
    assert_eq!(state.total_calls, 4);

    let fourth_neutral = harness.ok("editor_status", json!({})).await;
    assert_eq!(fourth_neutral["stall_guard"]["triggered"], true);
    assert_eq!(harness.editor.logs(), vec!["reading the scene".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_calls_leave_guard_untouched() {
    let mut harness = Harness::online();
    let unknown = harness.err("format_disk", json!({})).await;
    assert_eq!(unknown, "Unknown tool: format_disk");

    let invalid = harness.err("write_script", json!({ "path": "a.gd" })).await;
    assert!(invalid.starts_with("Invalid arguments:"));

    let escaped = harness
        .err("read_project_file", json!({ "path": "../outside.txt" }))
        .await;
    assert!(escaped.contains("'..'"));

    let missing = harness
        .err("read_project_file", json!({ "path": "nope.gd" }))
        .await;
    assert!(missing.starts_with("Tool execution failed:"));

    assert_eq!(harness.session.guard_state().total_calls, 0);
    assert!(!harness.project_file("a.gd").exists());
    assert_eq!(harness.editor.call_count("errors"), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn error_count_attached_with_directive_when_editor_reports_errors() {
    let mut harness = Harness::online();
    let clean = harness.ok("list_project_files", json!({})).await;
    assert_eq!(clean["error_count"], 0);
    assert!(clean.get("action_required").is_none());

    harness.editor.set_errors(ErrorReport {
        errors: vec![
            ErrorEntry::new("Unexpected indent").at("res://player.gd", 7),
            ErrorEntry::new("Identifier 'speed' not declared").at("res://player.gd", 12),
        ],
        warnings: vec![ErrorEntry::new("Unused variable")],
    });
    let dirty = harness
        .ok("write_script", json!({ "path": "player.gd", "content": "extends Node\n" }))
        .await;
    assert_eq!(dirty["error_count"], 2);
    assert_eq!(dirty["action_required"], error_directive(2));
    assert_eq!(dirty["dock_reminder"], DOCK_REMINDER);
}

#[tokio::test(flavor = "current_thread")]
async fn exempt_tools_never_query_errors() {
    let mut harness = Harness::online();
    harness.ok("editor_status", json!({})).await;
    harness.ok("get_errors", json!({})).await;
    harness.ok("get_phase", json!({})).await;
    harness.ok("get_build_state", json!({})).await;
    harness.ok("log_progress", json!({ "message": "hi" })).await;
    assert_eq!(harness.editor.call_count("errors"), 1);

    let status = harness.ok("editor_status", json!({})).await;
    assert!(status.get("error_count").is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_editor_omits_error_count_but_call_succeeds() {
    let mut harness = Harness::offline();
    let status = harness.ok("editor_status", json!({})).await;
    assert_eq!(status["connected"], false);

    let written = harness
        .ok("write_script", json!({ "path": "res://enemy.gd", "content": "extends Node\n" }))
        .await;
    assert_eq!(written["rescanned"], false);
    assert_eq!(harness.editor.call_count("rescan"), 0);
    assert!(written.get("error_count").is_none());
    assert!(harness.project_file("enemy.gd").is_file());

    let logged = harness.ok("log_progress", json!({ "message": "offline" })).await;
    assert_eq!(logged["logged"], false);
}

#[tokio::test(flavor = "current_thread")]
async fn bridge_required_tools_surface_unavailable() {
    let mut harness = Harness::offline();
    for (name, arguments) in [
        ("get_errors", json!({})),
        ("scene_tree", json!({})),
        ("run_project", json!({})),
        ("add_node", json!({ "parent_path": "/root/Main", "node_type": "Sprite2D", "node_name": "Hero" })),
    ] {
        let error = harness.err(name, arguments).await;
        assert!(
            error.starts_with("editor bridge unavailable"),
            "{name} returned: {error}"
        );
    }
    assert_eq!(harness.session.guard_state().total_calls, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn update_phase_reaches_dock_without_reminder() {
    let mut harness = Harness::online();
    let payload = harness
        .ok(
            "update_phase",
            json!({ "number": 2, "name": "Core loop", "status": "in_progress", "gates": { "compiles": true } }),
        )
        .await;
    assert_eq!(payload["accepted"], true);
    assert!(payload.get("dock_reminder").is_none());
    assert_eq!(payload["error_count"], 0);
    assert_eq!(harness.editor.phase().name, "Core loop");
    assert_eq!(harness.editor.phase().gates.get("compiles"), Some(&true));
}

#[tokio::test(flavor = "current_thread")]
async fn slow_error_query_drops_error_count_instead_of_failing() {
    let server = MockServer::start_async().await;
    let errors = server
        .mock_async(|when, then| {
            when.method(GET).path("/errors");
            then.status(200)
                .delay(Duration::from_millis(800))
                .json_body(json!({ "errors": [{ "message": "boom" }], "warnings": [] }));
        })
        .await;

    let temp = TempDir::new().expect("temp dir should be created");
    std::fs::write(temp.path().join("notes.txt"), "hello").expect("seed file should write");
    let bridge = HttpEditorBridge::new(server.base_url(), Duration::from_millis(100))
        .expect("client should build");
    let mut session = session_with_bridge(&temp, Arc::new(bridge));

    let response = session
        .call(ToolCall::new("read_project_file", json!({ "path": "notes.txt" })))
        .await;
    assert!(!response.is_error, "unexpected failure: {}", response.text());
    let payload = response.payload().expect("payload should be JSON");
    assert_eq!(payload["content"], "hello");
    assert!(payload.get("error_count").is_none());
    errors.assert_hits_async(1).await;
}
