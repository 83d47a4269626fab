use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildStateError {
    #[error("build state io failed for '{path}': {message}")]
    Io { path: String, message: String },
    #[error("build state serialization failed: {0}")]
    Serialization(String),
    #[error("a build is already in progress: {0}")]
    AlreadyActive(String),
    #[error("no build is in progress")]
    NotFound,
}

impl BuildStateError {
    pub(crate) fn io(path: &std::path::Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}
