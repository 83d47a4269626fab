use crate::errors::BuildStateError;
use crate::state::BuildState;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const STATE_DIR_NAME: &str = ".kiln";
pub const BUILD_STATE_FILE_NAME: &str = "build-state.json";
pub const BUILD_LOCK_FILE_NAME: &str = "build.lock";

pub fn build_state_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME).join(BUILD_STATE_FILE_NAME)
}

pub fn build_lock_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR_NAME).join(BUILD_LOCK_FILE_NAME)
}

#[derive(Clone, Debug)]
pub struct BuildStateStore {
    path: PathBuf,
}

impl BuildStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_project(project_root: &Path) -> Self {
        Self::new(build_state_path(project_root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces any prior checkpoint.
    pub fn save(&self, state: &BuildState) -> Result<(), BuildStateError> {
        debug!(
            path = %self.path.display(),
            build_id = %state.build_id,
            phase = state.current_phase.number,
            "saving build state"
        );
        let mut bytes = serde_json::to_vec_pretty(state)
            .map_err(|error| BuildStateError::Serialization(error.to_string()))?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes)
    }

    /// `Ok(None)` when no checkpoint exists.
    pub fn get(&self) -> Result<Option<BuildState>, BuildStateError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(BuildStateError::io(&self.path, error)),
        };
        let state = serde_json::from_slice(&bytes).map_err(|error| {
            BuildStateError::Serialization(format!(
                "failed deserializing '{}': {error}",
                self.path.display()
            ))
        })?;
        Ok(Some(state))
    }

    /// Returns whether a checkpoint was removed.
    pub fn clear(&self) -> Result<bool, BuildStateError> {
        remove_if_present(&self.path)
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BuildStateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| BuildStateError::io(parent, error))?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BuildStateError::Io {
            path: path.display().to_string(),
            message: "path has no file name".to_string(),
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, bytes).map_err(|error| BuildStateError::io(&tmp_path, error))?;
    fs::rename(&tmp_path, path).map_err(|error| BuildStateError::io(path, error))
}

pub(crate) fn remove_if_present(path: &Path) -> Result<bool, BuildStateError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(BuildStateError::io(path, error)),
    }
}
