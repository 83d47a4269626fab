use kiln_bridge::BridgeError;
use kiln_buildstate::BuildStateError;
use thiserror::Error;
use tracing::warn;

/// Failure of one dispatched call. `Display` is the text the agent sees.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    BuildState(#[from] BuildStateError),
}

impl ToolError {
    pub fn is_caller_mistake(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::InvalidArguments(_))
    }
}

/// The single place where bridge failures are deliberately discarded. Only bookkeeping calls
/// (error counts, operator log lines, follow-up rescans) go through here; primary handler
/// logic propagates `BridgeError` with `?`.
pub(crate) fn best_effort<T>(operation: &str, result: Result<T, BridgeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(operation, %error, "best-effort bridge call failed; continuing");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_errors_keep_their_original_message() {
        let error = ToolError::from(BridgeError::Unavailable("GET /status timed out".to_string()));
        assert_eq!(
            error.to_string(),
            "editor bridge unavailable: GET /status timed out"
        );
        assert!(!error.is_caller_mistake());
        assert!(ToolError::UnknownTool("x".to_string()).is_caller_mistake());
    }

    #[test]
    fn best_effort_discards_failures_only() {
        assert_eq!(best_effort("log", Ok::<_, BridgeError>(3)), Some(3));
        assert_eq!(
            best_effort::<u8>("log", Err(BridgeError::Protocol("bad".to_string()))),
            None
        );
    }
}
