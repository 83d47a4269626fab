use super::scene_file::parse_tscn;
use super::{
    ToolContext, io_error, optional_string_argument, relative_display, required_string_argument,
};
use crate::errors::{ToolError, best_effort};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub(super) const MAX_LISTED_FILES: usize = 500;
const ENGINE_CACHE_DIR: &str = ".godot";
const ADDONS_DIR: &str = "addons";
const PLUGIN_CONFIG: &str = "plugin.cfg";

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name == ENGINE_CACHE_DIR)
}

pub(super) fn list_files(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let start = match optional_string_argument(args, "directory")? {
        Some(directory) => ctx.resolve(&directory)?,
        None => ctx.project_root.clone(),
    };
    let extension = optional_string_argument(args, "extension")?
        .map(|extension| extension.trim_start_matches('.').to_ascii_lowercase());

    let mut files = Vec::new();
    let mut truncated = false;
    for entry in WalkDir::new(&start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
    {
        let entry = entry.map_err(|error| {
            ToolError::Execution(format!("failed to list '{}': {error}", start.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(extension) = &extension {
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if !matches {
                continue;
            }
        }
        if files.len() == MAX_LISTED_FILES {
            truncated = true;
            break;
        }
        files.push(relative_display(&ctx.project_root, entry.path()));
    }

    Ok(json!({ "count": files.len(), "truncated": truncated, "files": files }))
}

pub(super) fn read_file(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let raw = required_string_argument(args, "path")?;
    let path = ctx.resolve(&raw)?;
    let content = fs::read_to_string(&path).map_err(|error| io_error("read", &path, error))?;
    Ok(json!({
        "path": relative_display(&ctx.project_root, &path),
        "bytes": content.len(),
        "content": content,
    }))
}

pub(super) fn parse_scene(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let raw = required_string_argument(args, "path")?;
    let path = ctx.resolve(&raw)?;
    if path.extension().and_then(|ext| ext.to_str()) != Some("tscn") {
        return Err(ToolError::InvalidArguments(format!(
            "'{raw}' is not a .tscn scene file"
        )));
    }
    let source = fs::read_to_string(&path).map_err(|error| io_error("read", &path, error))?;
    let scene = parse_tscn(&source).map_err(|error| ToolError::Execution(error.to_string()))?;
    let mut payload = serde_json::to_value(scene)
        .map_err(|error| ToolError::Execution(error.to_string()))?;
    if let Value::Object(fields) = &mut payload {
        fields.insert(
            "path".to_string(),
            Value::String(relative_display(&ctx.project_root, &path)),
        );
    }
    Ok(payload)
}

fn write_project_file(path: &Path, content: &str) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| io_error("create", parent, error))?;
    }
    fs::write(path, content).map_err(|error| io_error("write", path, error))
}

/// Lets the editor import new files; an offline editor is skipped rather than reported.
async fn rescan_if_connected(ctx: &ToolContext) -> bool {
    if !ctx.bridge.is_connected().await {
        debug!("editor offline; skipping rescan");
        return false;
    }
    best_effort("rescan", ctx.bridge.rescan().await).is_some()
}

pub(super) async fn write_script(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let raw = required_string_argument(args, "path")?;
    let content = required_string_argument(args, "content")?;
    let path = ctx.resolve(&raw)?;
    write_project_file(&path, &content)?;
    debug!(path = %path.display(), bytes = content.len(), "script written");

    let rescanned = rescan_if_connected(ctx).await;
    Ok(json!({
        "path": relative_display(&ctx.project_root, &path),
        "bytes_written": content.len(),
        "rescanned": rescanned,
    }))
}

pub(super) fn generate_svg(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let raw = required_string_argument(args, "path")?;
    let svg = required_string_argument(args, "svg")?;
    let path = ctx.resolve(&raw)?;
    let is_svg_path = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    if !is_svg_path {
        return Err(ToolError::InvalidArguments(format!(
            "'{raw}' must have an .svg extension"
        )));
    }
    let markup = svg.trim_start();
    if !(markup.starts_with("<svg") || markup.starts_with("<?xml")) {
        return Err(ToolError::InvalidArguments(
            "svg must start with '<svg' or '<?xml'".to_string(),
        ));
    }
    write_project_file(&path, &svg)?;
    Ok(json!({
        "path": relative_display(&ctx.project_root, &path),
        "bytes_written": svg.len(),
    }))
}

fn addon_name(args: &Value) -> Result<String, ToolError> {
    let name = required_string_argument(args, "name")?;
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name != "..";
    if valid {
        Ok(name)
    } else {
        Err(ToolError::InvalidArguments(format!(
            "'{name}' is not a valid add-on directory name"
        )))
    }
}

pub(super) async fn install_addon(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let name = addon_name(args)?;
    let files: Map<String, Value> = match args.get("files") {
        Some(Value::Object(files)) => files.clone(),
        _ => {
            return Err(ToolError::InvalidArguments(
                "argument 'files' must be an object".to_string(),
            ));
        }
    };
    if !files.contains_key(PLUGIN_CONFIG) {
        return Err(ToolError::InvalidArguments(format!(
            "add-on files must include {PLUGIN_CONFIG}"
        )));
    }

    // Resolve everything before writing anything.
    let mut planned = Vec::with_capacity(files.len());
    for (relative, content) in &files {
        let content = content.as_str().ok_or_else(|| {
            ToolError::InvalidArguments(format!("content of '{relative}' must be a string"))
        })?;
        let path = ctx.resolve(&format!("{ADDONS_DIR}/{name}/{relative}"))?;
        planned.push((path, content));
    }

    let mut written = Vec::with_capacity(planned.len());
    for (path, content) in planned {
        write_project_file(&path, content)?;
        written.push(relative_display(&ctx.project_root, &path));
    }

    let rescanned = rescan_if_connected(ctx).await;
    Ok(json!({ "addon": name, "files_written": written, "rescanned": rescanned }))
}

/// `key="value"` pairs of the `[plugin]` section.
fn plugin_section(source: &str) -> Option<Map<String, Value>> {
    let mut in_plugin = false;
    let mut found = false;
    let mut fields = Map::new();
    for line in source.lines().map(str::trim) {
        if line.starts_with('[') {
            in_plugin = line == "[plugin]";
            found |= in_plugin;
            continue;
        }
        if !in_plugin || line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(
                key.trim().to_string(),
                Value::String(value.trim().trim_matches('"').to_string()),
            );
        }
    }
    found.then_some(fields)
}

pub(super) fn validate_addon(args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let name = addon_name(args)?;
    let addon_dir = ctx.resolve(&format!("{ADDONS_DIR}/{name}"))?;
    let config_path = addon_dir.join(PLUGIN_CONFIG);

    let mut issues = Vec::new();
    let mut plugin_name = None;
    let mut script = None;
    match fs::read_to_string(&config_path) {
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            issues.push(format!("{PLUGIN_CONFIG} not found"));
        }
        Err(error) => return Err(io_error("read", &config_path, error)),
        Ok(source) => match plugin_section(&source) {
            None => issues.push("missing [plugin] section".to_string()),
            Some(fields) => {
                plugin_name = fields.get("name").and_then(Value::as_str).map(str::to_string);
                script = fields.get("script").and_then(Value::as_str).map(str::to_string);
                if plugin_name.as_deref().is_none_or(str::is_empty) {
                    issues.push("[plugin] has no name".to_string());
                }
                match script.as_deref() {
                    None | Some("") => issues.push("[plugin] has no script".to_string()),
                    Some(script) => {
                        match ctx.resolve(&format!("{ADDONS_DIR}/{name}/{script}")) {
                            Ok(path) if path.is_file() => {}
                            Ok(_) => issues.push(format!("script '{script}' does not exist")),
                            Err(_) => issues.push(format!(
                                "script '{script}' resolves outside the project"
                            )),
                        }
                    }
                }
            }
        },
    }

    Ok(json!({
        "addon": name,
        "valid": issues.is_empty(),
        "plugin_name": plugin_name,
        "script": script,
        "issues": issues,
    }))
}
