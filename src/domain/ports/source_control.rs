//! Source-control port: one working copy, explicit handle.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::AgentResult;
use crate::domain::models::EditOperation;

/// Operations over the agent's single working copy.
///
/// All mutation of the workspace goes through this trait; no other
/// component writes under the workspace root.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Root of the working copy on disk.
    fn root(&self) -> &Path;

    /// Clone the target repository into the workspace (no-op if present).
    async fn clone_repo(&self) -> AgentResult<()>;

    /// Create and check out a branch derived from a human title.
    /// Returns the normalized, prefix-qualified branch name.
    async fn create_branch(&self, title: &str) -> AgentResult<String>;

    /// Apply structured edits in order, collecting failures.
    ///
    /// Partial success stays on disk; callers that care must
    /// `reset_workspace`.
    async fn apply_edits(&self, operations: &[EditOperation]) -> AgentResult<()>;

    async fn commit_and_push(&self, message: &str, force: bool) -> AgentResult<()>;

    async fn reset_to_main(&self) -> AgentResult<()>;

    async fn head_sha(&self) -> AgentResult<String>;

    /// One-line log of the `n` most recent commits on main.
    async fn recent_log(&self, n: u32) -> AgentResult<String>;

    /// Discard local changes, return to main, pull.
    async fn reset_workspace(&self) -> AgentResult<()>;

    /// Abbreviated diff vs main (created/deleted files summarized,
    /// output truncated past 500 lines).
    async fn diff(&self) -> AgentResult<String>;
}
