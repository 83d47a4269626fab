use crate::errors::BuildStateError;
use crate::store::{build_lock_path, remove_if_present, write_atomic};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Build-in-progress marker (`.kiln/build.lock`). Existence is the signal; the content is a
/// phase label for the operator.
#[derive(Clone, Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_project(project_root: &Path) -> Self {
        Self::new(build_lock_path(project_root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Creates the marker or refreshes its label.
    pub fn acquire(&self, label: &str) -> Result<(), BuildStateError> {
        info!(path = %self.path.display(), label, "build lock written");
        write_atomic(&self.path, format!("{label}\n").as_bytes())
    }

    pub fn label(&self) -> Result<Option<String>, BuildStateError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(BuildStateError::io(&self.path, error)),
        }
    }

    pub fn release(&self) -> Result<bool, BuildStateError> {
        let removed = remove_if_present(&self.path)?;
        if removed {
            info!(path = %self.path.display(), "build lock released");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_label_release_lifecycle() {
        let temp = TempDir::new().expect("temp dir should be created");
        let lock = BuildLock::for_project(temp.path());
        assert!(!lock.is_held());
        assert_eq!(lock.label().expect("label should read"), None);

        lock.acquire("Phase 1: Design").expect("acquire should succeed");
        assert!(lock.is_held());
        lock.acquire("Phase 2: Core loop")
            .expect("relabel should succeed");
        assert_eq!(
            lock.label().expect("label should read").as_deref(),
            Some("Phase 2: Core loop")
        );

        assert!(lock.release().expect("release should succeed"));
        assert!(!lock.release().expect("second release should succeed"));
        assert!(!lock.is_held());
    }
}
