use crate::lock::BuildLock;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stop-hook payload from the agent host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StopHookInput {
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionDecision {
    Allow,
    Block { reason: String },
}

impl StopHookInput {
    /// Project whose marker guards this stop: the configured root, then the host's `cwd`, then
    /// the hook process directory.
    pub fn project_root(&self, configured: Option<&Path>, process_dir: &Path) -> PathBuf {
        configured
            .filter(|root| !root.as_os_str().is_empty())
            .or(self.cwd.as_deref())
            .unwrap_or(process_dir)
            .to_path_buf()
    }
}

impl CompletionDecision {
    /// JSON printed on stdout; `None` means print nothing and let the session end.
    pub fn hook_output(&self) -> Option<Value> {
        match self {
            Self::Allow => None,
            Self::Block { reason } => Some(json!({ "decision": "block", "reason": reason })),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

pub fn evaluate_stop(input: &StopHookInput, project_root: &Path) -> CompletionDecision {
    // A retried stop always goes through, otherwise the host could loop forever.
    if input.stop_hook_active {
        debug!("stop hook already active; allowing");
        return CompletionDecision::Allow;
    }

    let lock = BuildLock::for_project(project_root);
    if !lock.is_held() {
        return CompletionDecision::Allow;
    }

    let label = match lock.label() {
        Ok(Some(label)) if !label.is_empty() => label,
        Ok(_) => "unknown phase".to_string(),
        Err(error) => {
            warn!(%error, "build lock exists but could not be read");
            "unknown phase".to_string()
        }
    };
    CompletionDecision::Block {
        reason: format!(
            "A build is still in progress ({label}). Finish every remaining build phase and call \
             finish_build before stopping. To cancel instead, ask the user to delete {}.",
            lock.path().display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn input(active: bool, cwd: &Path) -> StopHookInput {
        StopHookInput {
            stop_hook_active: active,
            cwd: Some(cwd.to_path_buf()),
        }
    }

    #[test]
    fn allows_when_marker_absent() {
        let temp = TempDir::new().expect("temp dir should be created");
        let decision = evaluate_stop(&input(false, temp.path()), temp.path());
        assert_eq!(decision, CompletionDecision::Allow);
        assert_eq!(decision.hook_output(), None);
    }

    #[test]
    fn blocks_with_phase_label_when_marker_present() {
        let temp = TempDir::new().expect("temp dir should be created");
        BuildLock::for_project(temp.path())
            .acquire("Phase 3: Enemies")
            .expect("acquire should succeed");

        let decision = evaluate_stop(&input(false, temp.path()), temp.path());
        let output = decision.hook_output().expect("block should produce output");
        assert_eq!(output["decision"], "block");
        assert!(
            output["reason"]
                .as_str()
                .is_some_and(|reason| reason.contains("Phase 3: Enemies"))
        );
    }

    #[test]
    fn retry_flag_always_allows_even_with_marker() {
        let temp = TempDir::new().expect("temp dir should be created");
        BuildLock::for_project(temp.path())
            .acquire("Phase 1: Design")
            .expect("acquire should succeed");

        let decision = evaluate_stop(&input(true, temp.path()), temp.path());
        assert!(!decision.is_block());
    }

    #[test]
    fn empty_label_reads_as_unknown_phase() {
        let temp = TempDir::new().expect("temp dir should be created");
        BuildLock::for_project(temp.path())
            .acquire("")
            .expect("acquire should succeed");

        match evaluate_stop(&StopHookInput::default(), temp.path()) {
            CompletionDecision::Block { reason } => assert!(reason.contains("unknown phase")),
            CompletionDecision::Allow => panic!("marker should block"),
        }
    }

    #[test]
    fn project_root_prefers_configured_then_cwd_then_process_dir() {
        let host = input(false, Path::new("/host/cwd"));
        let process_dir = Path::new("/process");

        assert_eq!(
            host.project_root(Some(Path::new("/configured")), process_dir),
            PathBuf::from("/configured")
        );
        assert_eq!(
            host.project_root(Some(Path::new("")), process_dir),
            PathBuf::from("/host/cwd")
        );
        assert_eq!(host.project_root(None, process_dir), PathBuf::from("/host/cwd"));
        assert_eq!(
            StopHookInput::default().project_root(None, process_dir),
            PathBuf::from("/process")
        );
    }

    #[test]
    fn configured_root_marker_blocks_when_host_cwd_differs() {
        let project = TempDir::new().expect("temp dir should be created");
        let elsewhere = TempDir::new().expect("temp dir should be created");
        BuildLock::for_project(project.path())
            .acquire("Phase 2: Core loop")
            .expect("acquire should succeed");

        let hook = input(false, elsewhere.path());
        let root = hook.project_root(Some(project.path()), elsewhere.path());
        assert!(evaluate_stop(&hook, &root).is_block());
    }
}
