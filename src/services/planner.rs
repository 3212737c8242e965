//! Planner and reflection dialogs.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{text_of, ContentBlock, Message, Phase, Plan};
use crate::domain::ports::LlmGateway;
use crate::services::prompts::reflect_prompt;
use crate::services::tools::{ToolRegistry, SUBMIT_PLAN};

/// Runaway guard on the planner dialog.
const MAX_PLANNER_TURNS: usize = 30;

/// Transcript text handed to reflection is cut to this many characters.
const TRANSCRIPT_LIMIT: usize = 60_000;

pub struct Planner {
    gateway: Arc<dyn LlmGateway>,
    tools: Arc<ToolRegistry>,
}

impl Planner {
    pub fn new(gateway: Arc<dyn LlmGateway>, tools: Arc<ToolRegistry>) -> Self {
        Self { gateway, tools }
    }

    /// Drive the planner dialog until it submits a plan.
    ///
    /// Returns the plan and the full planner transcript (reflection input).
    #[instrument(skip(self), err)]
    pub async fn plan(&self) -> AgentResult<(Plan, Vec<Message>)> {
        let mut conversation = vec![Message::user(
            "Choose the next change to make. Investigate with your tools as \
             needed, then call submit_plan.",
        )];
        let tool_defs = self.tools.planner_tools();

        for turn in 0..MAX_PLANNER_TURNS {
            let response = self
                .gateway
                .complete(Phase::Planner, &conversation, &tool_defs)
                .await?;
            conversation.push(Message::assistant(response.content.clone()));

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
                warn!(turn, "planner turn had no tool calls; prompting again");
                conversation.push(Message::user(
                    "Call submit_plan with your chosen title and description.",
                ));
                continue;
            }

            let mut results: Vec<ContentBlock> = Vec::new();
            for (id, name, input) in tool_uses {
                if name == SUBMIT_PLAN {
                    let plan = plan_from_input(&input)?;
                    debug!(title = %plan.title, "plan submitted");
                    results.push(ContentBlock::tool_result(id, "Plan accepted."));
                    conversation.push(Message::user(results));
                    return Ok((plan, conversation));
                }
                match self.tools.execute(&name, &input).await {
                    Ok(output) => results.push(ContentBlock::tool_result(id, output)),
                    Err(e) => results.push(ContentBlock::tool_error(id, e.to_string())),
                }
            }
            conversation.push(Message::user(results));
        }

        Err(AgentError::ToolUsage(format!(
            "planner did not submit a plan within {MAX_PLANNER_TURNS} turns"
        )))
    }

    /// Produce the post-iteration reflection text.
    #[instrument(skip(self, transcript), err)]
    pub async fn reflect(&self, outcome: &str, transcript: &[Message]) -> AgentResult<String> {
        let rendered = render_transcript(transcript);
        let truncated: String = rendered.chars().take(TRANSCRIPT_LIMIT).collect();
        let response = self
            .gateway
            .complete(
                Phase::Reflect,
                &[Message::user(reflect_prompt(outcome, &truncated))],
                &[],
            )
            .await?;
        Ok(text_of(&response.content).trim().to_string())
    }
}

fn plan_from_input(input: &Value) -> AgentResult<Plan> {
    let title = input
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ToolUsage("submit_plan requires a title".to_string()))?;
    let description = input
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let plan = Plan::new(title, description);
    plan.validate().map_err(AgentError::ToolUsage)?;
    Ok(plan)
}

/// Flatten a conversation for the reflection prompt. Thinking blocks are
/// omitted; tool traffic keeps names and truncated payloads.
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = match message.role {
            crate::domain::models::Role::User => "user",
            crate::domain::models::Role::Assistant => "assistant",
        };
        for block in message.blocks() {
            match block {
                ContentBlock::Text { text } => {
                    out.push_str(&format!("[{role}] {text}\n"));
                }
                ContentBlock::ToolUse { name, input, .. } => {
                    let args: String = input.to_string().chars().take(200).collect();
                    out.push_str(&format!("[{role}] tool_use {name} {args}\n"));
                }
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => {
                    let text: String = content.chars().take(200).collect();
                    let tag = if is_error == Some(true) { "error" } else { "ok" };
                    out.push_str(&format!("[{role}] tool_result ({tag}) {text}\n"));
                }
                ContentBlock::Thinking { .. } => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_from_input() {
        let plan =
            plan_from_input(&json!({"title": "Add greet", "description": "..."})).unwrap();
        assert_eq!(plan.title, "Add greet");

        assert!(plan_from_input(&json!({"description": "no title"})).is_err());
        assert!(plan_from_input(&json!({"title": "   "})).is_err());
    }

    #[test]
    fn test_render_transcript_skips_thinking() {
        let messages = vec![
            Message::user("go"),
            Message::assistant(vec![
                ContentBlock::Thinking {
                    thinking: "secret".into(),
                    signature: None,
                },
                ContentBlock::text("visible"),
                ContentBlock::ToolUse {
                    id: "tu_1".into(),
                    name: "read_file".into(),
                    input: json!({"filePath": "a.rs"}),
                },
            ]),
        ];
        let rendered = render_transcript(&messages);
        assert!(rendered.contains("[user] go"));
        assert!(rendered.contains("[assistant] visible"));
        assert!(rendered.contains("tool_use read_file"));
        assert!(!rendered.contains("secret"));
    }
}
