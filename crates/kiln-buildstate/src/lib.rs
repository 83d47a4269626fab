//! Durable build checkpoint, build lock marker and the completion guard that reads it.
//!
//! The checkpoint and the marker live under `<project_root>/.kiln/` and are the only state
//! shared between the tool server and the stop-hook process. Both are written with
//! temp-file-then-rename so a reader never observes a partial file.

pub mod completion;
pub mod errors;
pub mod lock;
pub mod phase;
pub mod state;
pub mod store;

pub use completion::{CompletionDecision, StopHookInput, evaluate_stop};
pub use errors::BuildStateError;
pub use lock::BuildLock;
pub use phase::{PhaseState, PhaseStatus};
pub use state::{
    BUILD_STATE_SCHEMA_VERSION, BuildState, CompletedPhase, ErrorRecord, QualityScore, TestRun,
};
pub use store::{
    BUILD_LOCK_FILE_NAME, BUILD_STATE_FILE_NAME, BuildStateStore, STATE_DIR_NAME,
    build_lock_path, build_state_path,
};
