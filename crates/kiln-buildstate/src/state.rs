use serde::{Deserialize, Serialize};

use crate::phase::{PhaseState, PhaseStatus};

pub const BUILD_STATE_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    BUILD_STATE_SCHEMA_VERSION
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedPhase {
    pub phase: PhaseState,
    #[serde(default)]
    pub completed_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub phase: Option<u32>,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub phase: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub phase: u32,
    pub gate: String,
    pub passed: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Checkpoint of a multi-phase build (`.kiln/build-state.json`).
///
/// The store persists this verbatim. Deciding whether listed files still exist or whether
/// completed gates still hold is the resuming agent's job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub build_id: String,
    #[serde(default)]
    pub started_at: Option<String>,
    pub current_phase: PhaseState,
    #[serde(default)]
    pub completed_phases: Vec<CompletedPhase>,
    #[serde(default)]
    pub files_written: Vec<String>,
    #[serde(default)]
    pub error_history: Vec<ErrorRecord>,
    #[serde(default)]
    pub test_runs: Vec<TestRun>,
    #[serde(default)]
    pub quality_scores: Vec<QualityScore>,
    #[serde(default)]
    pub design_document: Option<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl BuildState {
    pub fn new(
        build_id: impl Into<String>,
        first_phase_name: impl Into<String>,
        started_at: Option<String>,
    ) -> Self {
        Self {
            schema_version: BUILD_STATE_SCHEMA_VERSION,
            build_id: build_id.into(),
            started_at,
            current_phase: PhaseState {
                number: 1,
                name: first_phase_name.into(),
                status: PhaseStatus::InProgress,
                gates: Default::default(),
            },
            completed_phases: Vec::new(),
            files_written: Vec::new(),
            error_history: Vec::new(),
            test_runs: Vec::new(),
            quality_scores: Vec::new(),
            design_document: None,
            next_steps: Vec::new(),
        }
    }

    /// Human-readable label written into the lock marker.
    pub fn phase_label(&self) -> String {
        format!(
            "Phase {}: {}",
            self.current_phase.number, self.current_phase.name
        )
    }

    /// Sets the gate on the current phase and appends the score entry.
    pub fn record_quality_score(
        &mut self,
        gate: impl Into<String>,
        passed: bool,
        score: Option<f64>,
        notes: Option<String>,
    ) -> &QualityScore {
        let gate = gate.into();
        self.current_phase.gates.insert(gate.clone(), passed);
        self.quality_scores.push(QualityScore {
            phase: self.current_phase.number,
            gate,
            passed,
            score,
            notes,
        });
        &self.quality_scores[self.quality_scores.len() - 1]
    }

    pub fn unresolved_errors(&self) -> usize {
        self.error_history
            .iter()
            .filter(|record| !record.resolved)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_build_starts_phase_one_in_progress() {
        let state = BuildState::new("arcade-1", "Design", None);
        assert_eq!(state.current_phase.number, 1);
        assert_eq!(state.current_phase.status, PhaseStatus::InProgress);
        assert_eq!(state.phase_label(), "Phase 1: Design");
        assert_eq!(state.schema_version, BUILD_STATE_SCHEMA_VERSION);
    }

    #[test]
    fn record_quality_score_updates_current_gate_and_history() {
        let mut state = BuildState::new("arcade-1", "Design", None);
        state.record_quality_score("compiles", false, None, None);
        let recorded = state
            .record_quality_score("compiles", true, Some(8.5), Some("clean".to_string()))
            .clone();

        assert_eq!(recorded.phase, 1);
        assert_eq!(state.current_phase.gates.get("compiles"), Some(&true));
        assert_eq!(state.quality_scores.len(), 2);
    }

    #[test]
    fn minimal_document_fills_optional_lists() {
        let state: BuildState = serde_json::from_value(json!({
            "build_id": "b",
            "current_phase": { "number": 2, "name": "Core", "status": "in_progress" }
        }))
        .expect("minimal state should decode");
        assert_eq!(state.schema_version, BUILD_STATE_SCHEMA_VERSION);
        assert!(state.completed_phases.is_empty());
        assert!(state.current_phase.gates.is_empty());
        assert_eq!(state.unresolved_errors(), 0);
    }
}
