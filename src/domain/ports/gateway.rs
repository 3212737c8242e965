//! The phase-labeled completion port used by every dialog driver.

use async_trait::async_trait;
use uuid::Uuid;

use super::llm_client::{LlmResponse, ToolDef};
use crate::domain::errors::AgentResult;
use crate::domain::models::{Message, Phase};

/// Per-iteration dynamic context for system-prompt assembly.
///
/// The snapshot is the large stable block carrying the cache marker; the
/// rest are small per-iteration blocks appended after it.
#[derive(Debug, Clone, Default)]
pub struct IterationContext {
    pub codebase_snapshot: Option<String>,
    pub coverage_summary: Option<String>,
    pub git_log: Option<String>,
    pub memory_context: Option<String>,
    pub dead_functions: Option<String>,
}

/// Uniform request/response access to the model across phases.
///
/// Implementations persist every exchange before returning it, so callers
/// may assume the record exists once `complete` resolves.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(
        &self,
        phase: Phase,
        messages: &[Message],
        extra_tools: &[ToolDef],
    ) -> AgentResult<LlmResponse>;

    /// Set the iteration id and dynamic context for subsequent calls.
    async fn begin_iteration(&self, iteration_id: Uuid, context: IterationContext);

    /// Clear the iteration id after the final call of an iteration.
    async fn end_iteration(&self);
}
