//! CI / forge port: pull requests and asynchronous check results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::AgentResult;

/// Result of waiting for checks on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    /// Compact failure report when `passed` is false.
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn passed() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// An open PR created by this agent (head ref carries the agent prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPr {
    pub number: u64,
    pub head_ref: String,
}

/// Forge operations the controller needs.
#[async_trait]
pub trait CiBridge: Send + Sync {
    /// Open a PR from `branch` into main. Returns the PR number.
    async fn open_pr(&self, branch: &str, title: &str, body: &str) -> AgentResult<u64>;

    /// Squash-merge.
    async fn merge_pr(&self, number: u64) -> AgentResult<()>;

    async fn close_pr(&self, number: u64) -> AgentResult<()>;

    async fn delete_remote_branch(&self, name: &str) -> AgentResult<()>;

    /// Open PRs whose head ref starts with the agent branch prefix.
    async fn find_open_agent_prs(&self) -> AgentResult<Vec<AgentPr>>;

    /// Poll check runs for `sha` until they complete or time out.
    async fn await_checks(&self, sha: &str) -> AgentResult<CheckOutcome>;

    /// Best-effort coverage summary for main; `None` when unavailable.
    async fn latest_main_coverage(&self) -> AgentResult<Option<String>>;
}
