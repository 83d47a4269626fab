use crate::stall_guard::StallGuardConfig;
use std::path::PathBuf;

/// Runtime configuration for one tool session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub project_root: PathBuf,
    pub stall: StallGuardConfig,
}

impl SessionConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            stall: StallGuardConfig::default(),
        }
    }

    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_lookup(|key| std::env::var(key).ok(), cwd)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, default_root: PathBuf) -> Self {
        let project_root = lookup("KILN_PROJECT_ROOT")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or(default_root);
        Self {
            project_root,
            stall: StallGuardConfig::from_lookup(&lookup),
        }
    }
}
