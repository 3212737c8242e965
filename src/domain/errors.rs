//! Domain errors for the autograft agent.

use thiserror::Error;

/// Errors surfaced by the core components.
///
/// Tool-level failures (`EditConflict`, `ToolUsage`) are normally folded
/// back into the model dialog as `is_error` tool results rather than
/// propagated; the rest abort the current iteration.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Workspace setup failed: {0}")]
    WorkspaceSetupFailed(String),

    #[error("LLM batch failed: {0}")]
    LlmBatchFailed(String),

    #[error("LLM request timed out: {0}")]
    LlmTimeout(String),

    #[error("Edit conflict: {0}")]
    EditConflict(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Remote rate limited: {0}")]
    RemoteRateLimited(String),

    #[error("CI failed: {summary}")]
    CiFailed { summary: String },

    #[error("Timed out waiting for checks")]
    CiTimedOut,

    #[error("Invalid tool usage: {0}")]
    ToolUsage(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// Errors the controller can absorb by recording an outcome and
    /// starting a fresh plan, as opposed to aborting the process.
    pub fn aborts_iteration_only(&self) -> bool {
        matches!(
            self,
            Self::LlmBatchFailed(_)
                | Self::LlmTimeout(_)
                | Self::GitOperation(_)
                | Self::CiTimedOut
                | Self::CiFailed { .. }
        )
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_scoped_errors() {
        assert!(AgentError::LlmBatchFailed("expired".into()).aborts_iteration_only());
        assert!(AgentError::CiTimedOut.aborts_iteration_only());
        assert!(!AgentError::StorageUnavailable("down".into()).aborts_iteration_only());
        assert!(!AgentError::Cancelled.aborts_iteration_only());
    }

    #[test]
    fn test_display_messages() {
        let err = AgentError::CiFailed {
            summary: "tests failed".into(),
        };
        assert_eq!(err.to_string(), "CI failed: tests failed");
    }
}
