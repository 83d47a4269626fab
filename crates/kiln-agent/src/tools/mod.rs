mod build;
mod editor;
mod project;
mod scene;
mod scene_file;

use crate::errors::ToolError;
use kiln_bridge::EditorBridge;
use kiln_buildstate::{BuildLock, BuildStateStore};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use scene_file::{ParsedScene, SceneFileNode, parse_tscn};

/// How a call counts toward the stall streak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressClass {
    /// Produces an artifact or changes state; resets the streak.
    Mutating,
    /// Visibility only; neither counts nor resets.
    Passive,
    Neutral,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub parameters: Value,
}

/// The closed set of operations an agent can invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    EditorStatus,
    GetErrors,
    GetPhase,
    GetBuildState,
    LogProgress,
    UpdatePhase,
    SceneTree,
    ClassInfo,
    OpenScripts,
    CaptureScreenshot,
    RescanFilesystem,
    ListProjectFiles,
    ReadProjectFile,
    ParseSceneFile,
    WriteScript,
    GenerateSvgAsset,
    InstallAddon,
    ValidateAddon,
    AddNode,
    UpdateNode,
    DeleteNode,
    RunProject,
    StopProject,
    BeginBuild,
    SaveBuildState,
    RecordQualityScore,
    FinishBuild,
}

impl ToolKind {
    pub const ALL: [ToolKind; 27] = [
        Self::EditorStatus,
        Self::GetErrors,
        Self::GetPhase,
        Self::GetBuildState,
        Self::LogProgress,
        Self::UpdatePhase,
        Self::SceneTree,
        Self::ClassInfo,
        Self::OpenScripts,
        Self::CaptureScreenshot,
        Self::RescanFilesystem,
        Self::ListProjectFiles,
        Self::ReadProjectFile,
        Self::ParseSceneFile,
        Self::WriteScript,
        Self::GenerateSvgAsset,
        Self::InstallAddon,
        Self::ValidateAddon,
        Self::AddNode,
        Self::UpdateNode,
        Self::DeleteNode,
        Self::RunProject,
        Self::StopProject,
        Self::BeginBuild,
        Self::SaveBuildState,
        Self::RecordQualityScore,
        Self::FinishBuild,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::EditorStatus => "editor_status",
            Self::GetErrors => "get_errors",
            Self::GetPhase => "get_phase",
            Self::GetBuildState => "get_build_state",
            Self::LogProgress => "log_progress",
            Self::UpdatePhase => "update_phase",
            Self::SceneTree => "scene_tree",
            Self::ClassInfo => "class_info",
            Self::OpenScripts => "open_scripts",
            Self::CaptureScreenshot => "capture_screenshot",
            Self::RescanFilesystem => "rescan_filesystem",
            Self::ListProjectFiles => "list_project_files",
            Self::ReadProjectFile => "read_project_file",
            Self::ParseSceneFile => "parse_scene_file",
            Self::WriteScript => "write_script",
            Self::GenerateSvgAsset => "generate_svg_asset",
            Self::InstallAddon => "install_addon",
            Self::ValidateAddon => "validate_addon",
            Self::AddNode => "add_node",
            Self::UpdateNode => "update_node",
            Self::DeleteNode => "delete_node",
            Self::RunProject => "run_project",
            Self::StopProject => "stop_project",
            Self::BeginBuild => "begin_build",
            Self::SaveBuildState => "save_build_state",
            Self::RecordQualityScore => "record_quality_score",
            Self::FinishBuild => "finish_build",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn progress_class(self) -> ProgressClass {
        match self {
            Self::WriteScript
            | Self::GenerateSvgAsset
            | Self::InstallAddon
            | Self::ValidateAddon
            | Self::AddNode
            | Self::UpdateNode
            | Self::DeleteNode
            | Self::RunProject
            | Self::StopProject
            | Self::BeginBuild
            | Self::SaveBuildState
            | Self::RecordQualityScore
            | Self::FinishBuild => ProgressClass::Mutating,
            Self::LogProgress => ProgressClass::Passive,
            Self::EditorStatus
            | Self::GetErrors
            | Self::GetPhase
            | Self::GetBuildState
            | Self::UpdatePhase
            | Self::SceneTree
            | Self::ClassInfo
            | Self::OpenScripts
            | Self::CaptureScreenshot
            | Self::RescanFilesystem
            | Self::ListProjectFiles
            | Self::ReadProjectFile
            | Self::ParseSceneFile => ProgressClass::Neutral,
        }
    }

    /// Tools whose response never carries an error count.
    pub fn skips_error_check(self) -> bool {
        matches!(
            self,
            Self::EditorStatus
                | Self::GetErrors
                | Self::GetPhase
                | Self::GetBuildState
                | Self::LogProgress
        )
    }

    pub fn wants_dock_reminder(self) -> bool {
        !matches!(self, Self::LogProgress | Self::UpdatePhase)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::EditorStatus => {
                "Report whether the editor is reachable, which project it has open and whether it is playing."
            }
            Self::GetErrors => "List every script error and warning the editor currently reports.",
            Self::GetPhase => "Read the build phase shown in the editor dock.",
            Self::GetBuildState => {
                "Read the saved build checkpoint. Returns null when no build is in progress."
            }
            Self::LogProgress => "Append a one-line progress message to the editor's operator log.",
            Self::UpdatePhase => {
                "Show the current phase number, name, status and gate results in the editor dock."
            }
            Self::SceneTree => "Read the live scene tree from a root node down to a depth (default 3, max 10).",
            Self::ClassInfo => "Describe an engine class: parent, properties, methods and signals.",
            Self::OpenScripts => "List the scripts currently open in the editor.",
            Self::CaptureScreenshot => {
                "Capture the editor viewport and save it as a PNG inside the project."
            }
            Self::RescanFilesystem => "Ask the editor to rescan the project filesystem.",
            Self::ListProjectFiles => {
                "List project files, optionally under a directory and filtered by extension."
            }
            Self::ReadProjectFile => "Read a project file as text.",
            Self::ParseSceneFile => {
                "Statically parse a .tscn scene file and summarize its resources and nodes."
            }
            Self::WriteScript => "Write a script or other text file into the project.",
            Self::GenerateSvgAsset => "Write SVG markup to an .svg asset in the project.",
            Self::InstallAddon => {
                "Install an add-on into addons/<name>/. The files must include plugin.cfg."
            }
            Self::ValidateAddon => "Check that an installed add-on has a usable plugin.cfg and script.",
            Self::AddNode => "Add a node under a parent in the live scene.",
            Self::UpdateNode => "Set properties on a node in the live scene.",
            Self::DeleteNode => "Delete a node (and its children) from the live scene.",
            Self::RunProject => "Run the main scene, or a named scene.",
            Self::StopProject => "Stop the running project.",
            Self::BeginBuild => {
                "Start a multi-phase build: create the checkpoint and the build-in-progress marker."
            }
            Self::SaveBuildState => "Persist the full build checkpoint, replacing the previous one.",
            Self::RecordQualityScore => {
                "Record a quality gate result on the current phase of the build checkpoint."
            }
            Self::FinishBuild => {
                "End the build as completed or cancelled; removes the checkpoint and the marker."
            }
        }
    }

    pub fn parameters(self) -> Value {
        match self {
            Self::EditorStatus
            | Self::GetErrors
            | Self::GetPhase
            | Self::GetBuildState
            | Self::OpenScripts
            | Self::RescanFilesystem
            | Self::StopProject => object_schema(&[], json!({})),
            Self::LogProgress => object_schema(
                &["message"],
                json!({ "message": { "type": "string" } }),
            ),
            Self::UpdatePhase => object_schema(
                &["number", "name"],
                json!({
                    "number": { "type": "integer" },
                    "name": { "type": "string" },
                    "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] },
                    "gates": { "type": "object", "additionalProperties": { "type": "boolean" } }
                }),
            ),
            Self::SceneTree => object_schema(
                &[],
                json!({
                    "root": { "type": "string" },
                    "depth": { "type": "integer", "minimum": 1, "maximum": editor::MAX_SCENE_DEPTH }
                }),
            ),
            Self::ClassInfo => object_schema(
                &["class_name"],
                json!({ "class_name": { "type": "string" } }),
            ),
            Self::CaptureScreenshot => object_schema(&[], json!({ "path": { "type": "string" } })),
            Self::ListProjectFiles => object_schema(
                &[],
                json!({
                    "directory": { "type": "string" },
                    "extension": { "type": "string" }
                }),
            ),
            Self::ReadProjectFile | Self::ParseSceneFile => {
                object_schema(&["path"], json!({ "path": { "type": "string" } }))
            }
            Self::WriteScript => object_schema(
                &["path", "content"],
                json!({
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                }),
            ),
            Self::GenerateSvgAsset => object_schema(
                &["path", "svg"],
                json!({
                    "path": { "type": "string" },
                    "svg": { "type": "string" }
                }),
            ),
            Self::InstallAddon => object_schema(
                &["name", "files"],
                json!({
                    "name": { "type": "string" },
                    "files": { "type": "object", "additionalProperties": { "type": "string" } }
                }),
            ),
            Self::ValidateAddon => {
                object_schema(&["name"], json!({ "name": { "type": "string" } }))
            }
            Self::AddNode => object_schema(
                &["parent_path", "node_type", "node_name"],
                json!({
                    "parent_path": { "type": "string" },
                    "node_type": { "type": "string" },
                    "node_name": { "type": "string" },
                    "properties": { "type": "object" }
                }),
            ),
            Self::UpdateNode => object_schema(
                &["node_path", "properties"],
                json!({
                    "node_path": { "type": "string" },
                    "properties": { "type": "object" }
                }),
            ),
            Self::DeleteNode => {
                object_schema(&["node_path"], json!({ "node_path": { "type": "string" } }))
            }
            Self::RunProject => object_schema(&[], json!({ "scene": { "type": "string" } })),
            Self::BeginBuild => object_schema(
                &["build_id", "first_phase"],
                json!({
                    "build_id": { "type": "string" },
                    "first_phase": { "type": "string" },
                    "design_document": { "type": "string" }
                }),
            ),
            Self::SaveBuildState => {
                object_schema(&["state"], json!({ "state": { "type": "object" } }))
            }
            Self::RecordQualityScore => object_schema(
                &["gate", "passed"],
                json!({
                    "gate": { "type": "string" },
                    "passed": { "type": "boolean" },
                    "score": { "type": "number" },
                    "notes": { "type": "string" }
                }),
            ),
            Self::FinishBuild => object_schema(
                &["outcome"],
                json!({ "outcome": { "type": "string", "enum": ["completed", "cancelled"] } }),
            ),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

fn object_schema(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
        "additionalProperties": false
    })
}

/// Everything a handler may touch for one session.
#[derive(Clone)]
pub struct ToolContext {
    pub project_root: PathBuf,
    pub bridge: Arc<dyn EditorBridge>,
    pub store: BuildStateStore,
    pub lock: BuildLock,
}

impl ToolContext {
    pub fn new(project_root: impl Into<PathBuf>, bridge: Arc<dyn EditorBridge>) -> Self {
        let project_root = project_root.into();
        Self {
            store: BuildStateStore::for_project(&project_root),
            lock: BuildLock::for_project(&project_root),
            project_root,
            bridge,
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        resolve_project_path(&self.project_root, raw)
    }
}

pub(crate) async fn execute(
    kind: ToolKind,
    args: &Value,
    ctx: &ToolContext,
) -> Result<Value, ToolError> {
    match kind {
        ToolKind::EditorStatus => editor::status(ctx).await,
        ToolKind::GetErrors => editor::errors(ctx).await,
        ToolKind::GetPhase => editor::get_phase(ctx).await,
        ToolKind::GetBuildState => build::get(ctx),
        ToolKind::LogProgress => editor::log_progress(args, ctx).await,
        ToolKind::UpdatePhase => editor::update_phase(args, ctx).await,
        ToolKind::SceneTree => editor::scene_tree(args, ctx).await,
        ToolKind::ClassInfo => editor::class_info(args, ctx).await,
        ToolKind::OpenScripts => editor::open_scripts(ctx).await,
        ToolKind::CaptureScreenshot => editor::capture_screenshot(args, ctx).await,
        ToolKind::RescanFilesystem => editor::rescan(ctx).await,
        ToolKind::ListProjectFiles => project::list_files(args, ctx),
        ToolKind::ReadProjectFile => project::read_file(args, ctx),
        ToolKind::ParseSceneFile => project::parse_scene(args, ctx),
        ToolKind::WriteScript => project::write_script(args, ctx).await,
        ToolKind::GenerateSvgAsset => project::generate_svg(args, ctx),
        ToolKind::InstallAddon => project::install_addon(args, ctx).await,
        ToolKind::ValidateAddon => project::validate_addon(args, ctx),
        ToolKind::AddNode => scene::add_node(args, ctx).await,
        ToolKind::UpdateNode => scene::update_node(args, ctx).await,
        ToolKind::DeleteNode => scene::delete_node(args, ctx).await,
        ToolKind::RunProject => editor::run(args, ctx).await,
        ToolKind::StopProject => editor::stop(ctx).await,
        ToolKind::BeginBuild => build::begin(args, ctx),
        ToolKind::SaveBuildState => build::save(args, ctx),
        ToolKind::RecordQualityScore => build::record_quality_score(args, ctx),
        ToolKind::FinishBuild => build::finish(args, ctx),
    }
}

/// A missing or `null` argument list is treated as `{}`.
pub(crate) fn normalize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    }
}

pub(crate) fn validate_tool_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let object = arguments.as_object().ok_or_else(|| {
        ToolError::InvalidArguments(format!(
            "tool arguments must be a JSON object, received '{}'",
            json_type_name(arguments)
        ))
    })?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{key}'"
                )));
            }
        }
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let additional_allowed = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    for (key, value) in object {
        let Some(property) = properties.get(key) else {
            if additional_allowed {
                continue;
            }
            return Err(ToolError::InvalidArguments(format!(
                "unexpected argument '{key}'"
            )));
        };

        if let Some(type_name) = property.get("type").and_then(Value::as_str) {
            let is_valid = match type_name {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !is_valid {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{key}' expected type '{type_name}' but received '{}'",
                    json_type_name(value)
                )));
            }
        }

        if let (Some(allowed), Some(text)) = (
            property.get("enum").and_then(Value::as_array),
            value.as_str(),
        ) {
            if !allowed.iter().any(|candidate| candidate.as_str() == Some(text)) {
                return Err(ToolError::InvalidArguments(format!(
                    "argument '{key}' must be one of {}",
                    Value::Array(allowed.clone())
                )));
            }
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_string_argument(arguments: &Value, key: &str) -> Result<String, ToolError> {
    optional_string_argument(arguments, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument '{key}'")))
}

fn optional_string_argument(arguments: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{key}' must be a string"
        ))),
    }
}

fn optional_bool_argument(arguments: &Value, key: &str) -> Result<Option<bool>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{key}' must be a boolean"
        ))),
    }
}

fn optional_u64_argument(arguments: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    let Some(value) = arguments.get(key) else {
        return Ok(None);
    };
    value.as_u64().map(Some).ok_or_else(|| {
        ToolError::InvalidArguments(format!("argument '{key}' must be a positive integer"))
    })
}

fn optional_object_argument(
    arguments: &Value,
    key: &str,
) -> Result<Option<Map<String, Value>>, ToolError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{key}' must be an object"
        ))),
    }
}

/// Maps an agent-supplied path onto the project root. `res://` is accepted; absolute paths,
/// `..` and symlinks leading out of the project are not.
pub(crate) fn resolve_project_path(project_root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    let relative = raw.trim().strip_prefix("res://").unwrap_or(raw.trim());
    if relative.is_empty() {
        return Err(ToolError::InvalidArguments("path must not be empty".to_string()));
    }
    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ToolError::InvalidArguments(format!(
                    "path '{raw}' must not contain '..'"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::InvalidArguments(format!(
                    "path '{raw}' must be relative to the project"
                )));
            }
        }
    }
    let path = project_root.join(candidate);
    ensure_within_root(project_root, &path, raw)?;
    Ok(path)
}

/// Checks the deepest existing ancestor of `path` after symlinks are followed. A project root
/// that does not exist yet has nothing to redirect through.
fn ensure_within_root(project_root: &Path, path: &Path, raw: &str) -> Result<(), ToolError> {
    let Ok(canonical_root) = std::fs::canonicalize(project_root) else {
        return Ok(());
    };
    let outside = || {
        ToolError::InvalidArguments(format!("path '{raw}' resolves outside the project"))
    };
    for ancestor in path.ancestors() {
        if std::fs::symlink_metadata(ancestor).is_err() {
            continue;
        }
        // A dangling link fails here too.
        let canonical = std::fs::canonicalize(ancestor).map_err(|_| outside())?;
        return if canonical.starts_with(&canonical_root) {
            Ok(())
        } else {
            Err(outside())
        };
    }
    Ok(())
}

/// Project-relative display form with forward slashes.
fn relative_display(project_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(project_root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn io_error(action: &str, path: &Path, error: std::io::Error) -> ToolError {
    ToolError::Execution(format!("failed to {action} '{}': {error}", path.display()))
}

fn timestamp_now() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.{:03}Z",
        since_epoch.as_secs(),
        since_epoch.subsec_millis()
    )
}
