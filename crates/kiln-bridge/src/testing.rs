use crate::client::{BridgeError, EditorBridge, check_ack};
use crate::wire::{
    Ack, ClassInfo, EditorStatus, ErrorReport, NodeSpec, OpenScripts, PhaseProgress, SceneNode,
    Screenshot,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory editor used by dispatcher tests. Cloning shares state.
#[derive(Clone, Debug, Default)]
pub struct MockEditor {
    inner: Arc<Mutex<MockEditorState>>,
}

#[derive(Clone, Debug, Default)]
struct MockEditorState {
    offline: bool,
    report: ErrorReport,
    phase: PhaseProgress,
    playing: Option<String>,
    logs: Vec<String>,
    nodes: BTreeMap<String, (String, Map<String, Value>)>,
    open_scripts: Vec<String>,
    screenshot: Option<Screenshot>,
    rescans: usize,
    calls: Vec<&'static str>,
}

impl MockEditor {
    pub fn online() -> Self {
        let editor = Self::default();
        editor.insert_node("/root/Main", "Node2D");
        editor
    }

    pub fn offline() -> Self {
        let editor = Self::online();
        editor.set_online(false);
        editor
    }

    pub fn set_online(&self, online: bool) {
        self.with_state(|state| state.offline = !online);
    }

    pub fn set_errors(&self, report: ErrorReport) {
        self.with_state(|state| state.report = report);
    }

    pub fn set_open_scripts(&self, scripts: Vec<String>) {
        self.with_state(|state| state.open_scripts = scripts);
    }

    pub fn set_screenshot(&self, screenshot: Screenshot) {
        self.with_state(|state| state.screenshot = Some(screenshot));
    }

    pub fn insert_node(&self, path: &str, node_type: &str) {
        self.with_state(|state| {
            state
                .nodes
                .insert(path.to_string(), (node_type.to_string(), Map::new()));
        });
    }

    pub fn logs(&self) -> Vec<String> {
        self.with_state(|state| state.logs.clone())
    }

    pub fn phase(&self) -> PhaseProgress {
        self.with_state(|state| state.phase.clone())
    }

    pub fn node_paths(&self) -> Vec<String> {
        self.with_state(|state| state.nodes.keys().cloned().collect())
    }

    pub fn node_properties(&self, path: &str) -> Option<Map<String, Value>> {
        self.with_state(|state| state.nodes.get(path).map(|(_, props)| props.clone()))
    }

    pub fn playing_scene(&self) -> Option<String> {
        self.with_state(|state| state.playing.clone())
    }

    pub fn rescans(&self) -> usize {
        self.with_state(|state| state.rescans)
    }

    /// Names of every bridge call received, including ones refused while offline.
    pub fn calls(&self) -> Vec<&'static str> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.with_state(|state| state.calls.iter().filter(|call| **call == name).count())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockEditorState) -> T) -> T {
        let mut state = self.inner.lock().expect("mock editor mutex poisoned");
        f(&mut state)
    }

    fn enter(&self, call: &'static str) -> Result<(), BridgeError> {
        self.with_state(|state| {
            state.calls.push(call);
            if state.offline {
                Err(BridgeError::Unavailable(format!(
                    "{call}: mock editor is offline"
                )))
            } else {
                Ok(())
            }
        })
    }
}

#[async_trait]
impl EditorBridge for MockEditor {
    async fn status(&self) -> Result<EditorStatus, BridgeError> {
        self.enter("status")?;
        Ok(self.with_state(|state| EditorStatus {
            project_name: "mock-project".to_string(),
            editor_version: Some("4.3.stable".to_string()),
            is_playing: state.playing.is_some(),
            current_scene: Some("res://main.tscn".to_string()),
        }))
    }

    async fn errors(&self) -> Result<ErrorReport, BridgeError> {
        self.enter("errors")?;
        Ok(self.with_state(|state| state.report.clone()))
    }

    async fn run(&self, scene: Option<&str>) -> Result<Ack, BridgeError> {
        self.enter("run")?;
        let scene = scene.unwrap_or("res://main.tscn").to_string();
        self.with_state(|state| state.playing = Some(scene));
        Ok(Ack::ok())
    }

    async fn stop(&self) -> Result<Ack, BridgeError> {
        self.enter("stop")?;
        let was_playing = self.with_state(|state| state.playing.take().is_some());
        check_ack(Ack {
            ok: was_playing,
            message: Some("project is not running".to_string()),
        })
    }

    async fn rescan(&self) -> Result<Ack, BridgeError> {
        self.enter("rescan")?;
        self.with_state(|state| state.rescans += 1);
        Ok(Ack::ok())
    }

    async fn log(&self, message: &str) -> Result<Ack, BridgeError> {
        self.enter("log")?;
        self.with_state(|state| state.logs.push(message.to_string()));
        Ok(Ack::ok())
    }

    async fn get_phase(&self) -> Result<PhaseProgress, BridgeError> {
        self.enter("get_phase")?;
        Ok(self.phase())
    }

    async fn set_phase(&self, phase: &PhaseProgress) -> Result<Ack, BridgeError> {
        self.enter("set_phase")?;
        self.with_state(|state| state.phase = phase.clone());
        Ok(Ack::ok())
    }

    async fn scene_tree(&self, root: Option<&str>, depth: u32) -> Result<SceneNode, BridgeError> {
        self.enter("scene_tree")?;
        let root = root.unwrap_or("/root/Main").to_string();
        let nodes = self.with_state(|state| state.nodes.clone());
        build_subtree(&nodes, &root, depth)
            .ok_or_else(|| BridgeError::Rejected(format!("node '{root}' not found")))
    }

    async fn class_info(&self, class_name: &str) -> Result<ClassInfo, BridgeError> {
        self.enter("class_info")?;
        Ok(ClassInfo {
            class_name: class_name.to_string(),
            parent_class: Some("Node".to_string()),
            properties: Vec::new(),
            methods: vec!["_ready".to_string(), "_process".to_string()],
            signals: vec!["ready".to_string()],
        })
    }

    async fn add_node(&self, spec: &NodeSpec) -> Result<Ack, BridgeError> {
        self.enter("add_node")?;
        let path = format!("{}/{}", spec.parent_path.trim_end_matches('/'), spec.node_name);
        self.with_state(|state| {
            if !state.nodes.contains_key(&spec.parent_path) {
                return check_ack(Ack {
                    ok: false,
                    message: Some(format!("parent '{}' not found", spec.parent_path)),
                });
            }
            state
                .nodes
                .insert(path, (spec.node_type.clone(), spec.properties.clone()));
            Ok(Ack::ok())
        })
    }

    async fn update_node(
        &self,
        node_path: &str,
        properties: &Map<String, Value>,
    ) -> Result<Ack, BridgeError> {
        self.enter("update_node")?;
        self.with_state(|state| match state.nodes.get_mut(node_path) {
            Some((_, existing)) => {
                existing.extend(properties.clone());
                Ok(Ack::ok())
            }
            None => check_ack(Ack {
                ok: false,
                message: Some(format!("node '{node_path}' not found")),
            }),
        })
    }

    async fn delete_node(&self, node_path: &str) -> Result<Ack, BridgeError> {
        self.enter("delete_node")?;
        self.with_state(|state| {
            let prefix = format!("{node_path}/");
            let before = state.nodes.len();
            state
                .nodes
                .retain(|path, _| path != node_path && !path.starts_with(&prefix));
            check_ack(Ack {
                ok: state.nodes.len() < before,
                message: Some(format!("node '{node_path}' not found")),
            })
        })
    }

    async fn screenshot(&self) -> Result<Screenshot, BridgeError> {
        self.enter("screenshot")?;
        self.with_state(|state| state.screenshot.clone())
            .ok_or_else(|| BridgeError::Rejected("viewport unavailable".to_string()))
    }

    async fn open_scripts(&self) -> Result<OpenScripts, BridgeError> {
        self.enter("open_scripts")?;
        Ok(OpenScripts {
            scripts: self.with_state(|state| state.open_scripts.clone()),
        })
    }
}

fn build_subtree(
    nodes: &BTreeMap<String, (String, Map<String, Value>)>,
    path: &str,
    depth: u32,
) -> Option<SceneNode> {
    let (node_type, _) = nodes.get(path)?;
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let children = if depth == 0 {
        Vec::new()
    } else {
        nodes
            .keys()
            .filter(|candidate| {
                candidate
                    .strip_prefix(path)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .filter_map(|child| build_subtree(nodes, child, depth - 1))
            .collect()
    };
    Some(SceneNode {
        name,
        node_type: node_type.clone(),
        path: path.to_string(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn mock_editor_offline_refuses_every_call_but_records_it() {
        let editor = MockEditor::offline();
        assert!(!editor.is_connected().await);
        let error = editor.errors().await.expect_err("offline errors should fail");
        assert!(error.is_unavailable());
        assert_eq!(editor.calls(), vec!["status", "errors"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mock_editor_scene_tree_respects_depth() {
        let editor = MockEditor::online();
        editor.insert_node("/root/Main/Player", "CharacterBody2D");
        editor.insert_node("/root/Main/Player/Sprite", "Sprite2D");

        let shallow = editor
            .scene_tree(None, 1)
            .await
            .expect("tree should resolve");
        assert_eq!(shallow.node_count(), 2);
        let deep = editor
            .scene_tree(None, 5)
            .await
            .expect("tree should resolve");
        assert_eq!(deep.node_count(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mock_editor_delete_removes_descendants() {
        let editor = MockEditor::online();
        editor.insert_node("/root/Main/Player", "CharacterBody2D");
        editor.insert_node("/root/Main/Player/Sprite", "Sprite2D");

        editor
            .delete_node("/root/Main/Player")
            .await
            .expect("delete should succeed");
        assert_eq!(editor.node_paths(), vec!["/root/Main".to_string()]);
        let error = editor
            .delete_node("/root/Main/Player")
            .await
            .expect_err("second delete should be rejected");
        assert!(matches!(error, BridgeError::Rejected(_)));
    }
}
