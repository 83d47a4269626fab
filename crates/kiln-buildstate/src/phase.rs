//! Phase progress shared by the checkpoint and the editor dock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl TryFrom<&str> for PhaseStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!(
                "unknown phase status '{other}' (expected pending, in_progress or completed)"
            )),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub number: u32,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub gates: BTreeMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_status_uses_snake_case_on_the_wire() {
        let phase = PhaseState {
            number: 2,
            name: "Core loop".to_string(),
            status: PhaseStatus::InProgress,
            gates: BTreeMap::from([("compiles".to_string(), true)]),
        };
        let value = serde_json::to_value(&phase).expect("phase should encode");
        assert_eq!(value["status"], "in_progress");
        assert_eq!(PhaseStatus::try_from("completed"), Ok(PhaseStatus::Completed));
        assert!(PhaseStatus::try_from("done").is_err());
    }
}
