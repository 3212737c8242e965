//! The stateful builder/fixer dialog scoped to one iteration.
//!
//! Drives a multi-turn tool-calling conversation with the gateway. Edit
//! tools apply to the workspace as they arrive and accumulate into the
//! operation list returned to the controller. Tool failures become
//! `is_error` tool results so the model can recover in-dialog.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{ContentBlock, EditOperation, Message, Phase, Plan};
use crate::domain::ports::LlmGateway;
use crate::services::tools::{edit_operation_from_input, ToolRegistry, SUBMIT_EDITS};

/// Runaway guard on dialog length.
const MAX_DIALOG_TURNS: usize = 50;

/// CI error text is cut to this many characters in fixer input.
const CI_ERROR_LIMIT: usize = 6_000;

pub struct PatchSession {
    gateway: Arc<dyn LlmGateway>,
    tools: Arc<ToolRegistry>,
    plan: Plan,
    memory_context: String,
    conversation: Vec<Message>,
    attempts: u32,
    max_fix_attempts: u32,
}

impl PatchSession {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        tools: Arc<ToolRegistry>,
        plan: Plan,
        memory_context: String,
        max_fix_attempts: u32,
    ) -> Self {
        Self {
            gateway,
            tools,
            plan,
            memory_context,
            conversation: Vec::new(),
            attempts: 0,
            max_fix_attempts,
        }
    }

    /// True once fix attempts are used up.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_fix_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The full transcript (used by reflection).
    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Drive the builder dialog to produce the initial patch.
    #[instrument(skip(self), err)]
    pub async fn create_patch(&mut self) -> AgentResult<Vec<EditOperation>> {
        let opening = format!(
            "Implement this change.\n\nTitle: {}\n\nDescription:\n{}\n\n\
             Your memory context:\n{}",
            self.plan.title, self.plan.description, self.memory_context
        );
        self.drive(Phase::Builder, opening).await
    }

    /// Drive the fixer dialog after a CI failure.
    ///
    /// Errors if the session is exhausted; otherwise increments the
    /// attempt counter before contacting the model.
    #[instrument(skip(self, ci_error, diff), err)]
    pub async fn fix_patch(&mut self, ci_error: &str, diff: &str) -> AgentResult<Vec<EditOperation>> {
        if self.exhausted() {
            return Err(AgentError::ToolUsage(format!(
                "patch session exhausted after {} fix attempts",
                self.attempts
            )));
        }
        self.attempts += 1;
        let truncated: String = ci_error.chars().take(CI_ERROR_LIMIT).collect();
        let opening = format!(
            "CI failed for the change \"{}\". Fix it.\n\nCI error:\n{truncated}\n\n\
             Current diff vs main:\n{diff}",
            self.plan.title
        );
        self.drive(Phase::Fixer, opening).await
    }

    /// The shared dialog loop: send, execute tool calls, repeat until the
    /// assistant stops calling tools (or submits edits explicitly).
    async fn drive(&mut self, phase: Phase, opening: String) -> AgentResult<Vec<EditOperation>> {
        self.conversation.push(Message::user(opening));
        let mut operations: Vec<EditOperation> = Vec::new();
        let tool_defs = self.tools.builder_tools();

        for turn in 0..MAX_DIALOG_TURNS {
            let response = self
                .gateway
                .complete(phase, &self.conversation, &tool_defs)
                .await?;
            self.conversation
                .push(Message::assistant(response.content.clone()));

            let tool_uses: Vec<(String, String, Value)> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if tool_uses.is_empty() {
                debug!(turn, "assistant finished without tool calls");
                return Ok(operations);
            }

            let mut results: Vec<ContentBlock> = Vec::new();
            let mut submitted = false;
            for (id, name, input) in tool_uses {
                if name == SUBMIT_EDITS {
                    match self.apply_submitted(&input).await {
                        Ok(applied) => {
                            operations.extend(applied);
                            results.push(ContentBlock::tool_result(id, "Edits submitted."));
                            submitted = true;
                        }
                        Err(e) => {
                            results.push(ContentBlock::tool_error(id, e.to_string()));
                        }
                    }
                    continue;
                }

                match self.tools.execute(&name, &input).await {
                    Ok(output) => {
                        // Successful edit tools count toward the patch.
                        if matches!(name.as_str(), "edit_file" | "create_file" | "delete_file") {
                            operations.push(edit_operation_from_input(&name, &input)?);
                        }
                        results.push(ContentBlock::tool_result(id, output));
                    }
                    Err(e) => {
                        debug!(tool = %name, error = %e, "tool call failed");
                        results.push(ContentBlock::tool_error(id, e.to_string()));
                    }
                }
            }

            self.conversation.push(Message::user(results));
            if submitted {
                return Ok(operations);
            }
        }

        warn!("dialog exceeded {MAX_DIALOG_TURNS} turns; returning accumulated edits");
        Ok(operations)
    }

    /// Apply the operation list carried by an explicit submit_edits call.
    async fn apply_submitted(&self, input: &Value) -> AgentResult<Vec<EditOperation>> {
        let raw = input
            .get("operations")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AgentError::ToolUsage("submit_edits requires an operations array".to_string())
            })?;
        let operations: Vec<EditOperation> = raw
            .iter()
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    AgentError::ToolUsage(format!("malformed edit operation: {e}"))
                })
            })
            .collect::<AgentResult<Vec<_>>>()?;
        // Registry-applied edits already hit the disk; these have not.
        self.tools.workspace().apply_edits(&operations).await?;
        Ok(operations)
    }
}
