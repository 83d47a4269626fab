#![allow(dead_code)]

use kiln_agent::{SessionConfig, ToolCall, ToolSession};
use kiln_bridge::{EditorBridge, MockEditor};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub temp: TempDir,
    pub editor: MockEditor,
    pub session: ToolSession,
}

impl Harness {
    pub fn online() -> Self {
        Self::with_editor(MockEditor::online())
    }

    pub fn offline() -> Self {
        Self::with_editor(MockEditor::offline())
    }

    pub fn with_editor(editor: MockEditor) -> Self {
        let temp = TempDir::new().expect("temp dir should be created");
        let session = session_with_bridge(&temp, Arc::new(editor.clone()));
        Self {
            temp,
            editor,
            session,
        }
    }

    /// Successful call payload; panics with the error text otherwise.
    pub async fn ok(&mut self, name: &str, arguments: Value) -> Value {
        let response = self.session.call(ToolCall::new(name, arguments)).await;
        assert!(
            !response.is_error,
            "{name} should succeed but failed with: {}",
            response.text()
        );
        response.payload().expect("success payload should be JSON")
    }

    /// Error text of a failed call; panics if the call succeeded.
    pub async fn err(&mut self, name: &str, arguments: Value) -> String {
        let response = self.session.call(ToolCall::new(name, arguments)).await;
        assert!(response.is_error, "{name} should fail but succeeded");
        response.text()
    }

    pub fn project_file(&self, relative: &str) -> std::path::PathBuf {
        self.temp.path().join(relative)
    }
}

pub fn session_with_bridge(temp: &TempDir, bridge: Arc<dyn EditorBridge>) -> ToolSession {
    ToolSession::new(SessionConfig::new(temp.path()), bridge)
}
