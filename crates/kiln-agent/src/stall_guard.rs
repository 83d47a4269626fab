use crate::tools::{ProgressClass, ToolKind};
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_INITIAL_LIMIT: u32 = 4;
pub const DEFAULT_STEADY_LIMIT: u32 = 6;
/// Streak length beyond the active limit at which the directive escalates.
pub const HARD_LIMIT_MARGIN: u32 = 2;

const SOFT_DIRECTIVE: &str = "You have made several calls in a row without producing anything. \
Your next action must be a mutating one (write a script, edit the scene, save build state, \
run the project, record a quality score). If you cannot proceed, say so and name what is blocking you.";

const HARD_DIRECTIVE: &str = "STOP PLANNING. You are stalled. Either perform a mutating action \
now or report the specific blocker that prevents you from doing so. Do not make another \
read-only call.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StallGuardConfig {
    /// Active limit until the first mutating-progress call.
    pub initial_limit: u32,
    /// Active limit for the rest of the session.
    pub steady_limit: u32,
}

impl Default for StallGuardConfig {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_INITIAL_LIMIT,
            steady_limit: DEFAULT_STEADY_LIMIT,
        }
    }
}

impl StallGuardConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            initial_limit: positive_limit(lookup("KILN_STALL_INITIAL_LIMIT"), DEFAULT_INITIAL_LIMIT),
            steady_limit: positive_limit(lookup("KILN_STALL_STEADY_LIMIT"), DEFAULT_STEADY_LIMIT),
        }
    }
}

fn positive_limit(raw: Option<String>, fallback: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

/// Per-session counters. Only [`StallGuard::observe`] mutates them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionGuardState {
    pub total_calls: u64,
    pub non_mutating_streak: u32,
    pub saw_mutating_progress: bool,
    pub last_mutating_tool: Option<String>,
    pub last_mutating_call_index: Option<u64>,
}

/// Payload attached to a response once the streak reaches the active limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StallReport {
    pub triggered: bool,
    pub streak: u32,
    pub limit: u32,
    pub hard_limit: u32,
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_progress_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_progress_call_index: Option<u64>,
    pub directive: String,
}

#[derive(Clone, Debug, Default)]
pub struct StallGuard {
    config: StallGuardConfig,
    state: SessionGuardState,
}

impl StallGuard {
    pub fn new(config: StallGuardConfig) -> Self {
        Self {
            config,
            state: SessionGuardState::default(),
        }
    }

    pub fn snapshot(&self) -> &SessionGuardState {
        &self.state
    }

    pub fn active_limit(&self) -> u32 {
        if self.state.saw_mutating_progress {
            self.config.steady_limit
        } else {
            self.config.initial_limit
        }
    }

    /// Records one successfully completed call and returns the payload to attach, if any.
    pub fn observe(&mut self, kind: ToolKind) -> Option<StallReport> {
        self.state.total_calls += 1;
        match kind.progress_class() {
            ProgressClass::Mutating => {
                self.state.non_mutating_streak = 0;
                self.state.saw_mutating_progress = true;
                self.state.last_mutating_tool = Some(kind.name().to_string());
                self.state.last_mutating_call_index = Some(self.state.total_calls);
            }
            ProgressClass::Passive => {}
            ProgressClass::Neutral => {
                self.state.non_mutating_streak = self.state.non_mutating_streak.saturating_add(1);
            }
        }
        debug!(
            tool = kind.name(),
            streak = self.state.non_mutating_streak,
            limit = self.active_limit(),
            "stall guard observed call"
        );
        self.report()
    }

    /// Current payload, `None` while under the limit.
    pub fn report(&self) -> Option<StallReport> {
        let streak = self.state.non_mutating_streak;
        let limit = self.active_limit();
        if streak < limit {
            return None;
        }
        let hard_limit = limit.saturating_add(HARD_LIMIT_MARGIN);
        let escalated = streak >= hard_limit;
        if escalated {
            warn!(streak, hard_limit, "agent stalled past hard limit");
        }
        Some(StallReport {
            triggered: true,
            streak,
            limit,
            hard_limit,
            escalated,
            last_progress_tool: self.state.last_mutating_tool.clone(),
            last_progress_call_index: self.state.last_mutating_call_index,
            directive: if escalated { HARD_DIRECTIVE } else { SOFT_DIRECTIVE }.to_string(),
        })
    }
}
