//! Tool dispatch loop between a coding agent and the editor bridge.
//!
//! A [`ToolSession`] owns everything one agent session needs: the closed tool catalog, the
//! bridge handle, the build checkpoint store and the [`StallGuard`] counters. Each call is
//! validated, executed once, observed by the guard and then augmented with the editor's
//! current error count before it goes back to the agent.

pub mod augment;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod session;
pub mod stall_guard;
pub mod tools;

pub use augment::{DOCK_REMINDER, augment_result, error_directive};
pub use config::SessionConfig;
pub use errors::ToolError;
pub use protocol::{ToolCall, ToolContent, ToolResponse};
pub use session::ToolSession;
pub use stall_guard::{
    DEFAULT_INITIAL_LIMIT, DEFAULT_STEADY_LIMIT, HARD_LIMIT_MARGIN, SessionGuardState,
    StallGuard, StallGuardConfig, StallReport,
};
pub use tools::{ProgressClass, ToolContext, ToolDefinition, ToolKind};
