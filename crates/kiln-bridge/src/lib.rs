#![doc = r#"
Typed client for the editor bridge.

Operation mapping:

| `EditorBridge` method | Wire call |
| --- | --- |
| `status` | `GET /status` |
| `errors` | `GET /errors` |
| `run` / `stop` | `POST /run`, `POST /stop` |
| `rescan` | `POST /rescan` |
| `log` | `POST /log` |
| `get_phase` / `set_phase` | `GET /phase`, `POST /phase` |
| `scene_tree` | `GET /scene-tree?depth=N[&root=path]` |
| `class_info` | `GET /class-info?class=Name` |
| `add_node` / `update_node` / `delete_node` | `POST /node/add`, `POST /node/update`, `POST /node/delete` |
| `screenshot` | `GET /screenshot` |
| `open_scripts` | `GET /open-scripts` |

Implementation notes:
- Every call is bounded by one request timeout (5s unless configured). Connect failures and
  timeouts both surface as `BridgeError::Unavailable`; nothing is retried here.
- Acknowledgements carrying `ok: false` become `BridgeError::Rejected`.
- `is_connected` is the only call that swallows errors. File-writing tools use it to skip the
  follow-up rescan when the editor is not running.
"#]

pub mod client;
pub mod testing;
pub mod wire;

pub use client::{
    BridgeConfig, BridgeError, DEFAULT_BRIDGE_HOST, DEFAULT_BRIDGE_PORT, DEFAULT_BRIDGE_TIMEOUT,
    EditorBridge, HttpEditorBridge,
};
pub use testing::MockEditor;
pub use wire::{
    Ack, ClassInfo, EditorStatus, ErrorEntry, ErrorReport, NodeSpec, OpenScripts, PhaseProgress,
    PhaseStatus, SceneNode, Screenshot,
};
