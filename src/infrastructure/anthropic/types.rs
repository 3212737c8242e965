//! Wire types for the vendor's Messages and Message Batches APIs.

use serde::{Deserialize, Serialize};

use crate::domain::models::{ContentBlock, Message, TokenUsage};
use crate::domain::ports::llm_client::LlmRequest;

/// `{"type": "ephemeral"}` cache hint on a system block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub control_type: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral".to_string(),
        }
    }
}

/// One text block of the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Extended-thinking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub config_type: String,
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            config_type: "enabled".to_string(),
            budget_tokens,
        }
    }
}

/// Tool definition on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Params of one Messages request (the `params` member of a batch item).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageParams {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub system: Vec<WireSystemBlock>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl MessageParams {
    /// Lower a domain request onto the wire. The thinking budget widens the
    /// response ceiling: effective max_tokens = max_tokens + budget.
    pub fn from_request(request: &LlmRequest) -> Self {
        let system = request
            .system
            .iter()
            .map(|block| WireSystemBlock {
                block_type: "text".to_string(),
                text: block.text.clone(),
                cache_control: block.cache_marker.then(CacheControl::ephemeral),
            })
            .collect();
        let tools = request
            .tools
            .iter()
            .map(|tool| WireTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect();
        Self {
            model: request.model.clone(),
            max_tokens: request.max_tokens + request.thinking_budget.unwrap_or(0),
            system,
            messages: request.messages.clone(),
            tools,
            thinking: request.thinking_budget.map(ThinkingConfig::enabled),
        }
    }
}

/// One item of a batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestItem {
    pub custom_id: String,
    pub params: MessageParams,
}

/// Body of `POST /v1/messages/batches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub requests: Vec<BatchRequestItem>,
}

/// Batch object returned on submit and poll.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchObject {
    pub id: String,
    pub processing_status: String,
}

/// An assistant message as returned inside a batch result.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// `result` member of one results line.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    #[serde(rename = "type")]
    pub result_type: String,
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// One line of the JSONL results stream.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResultLine {
    pub custom_id: String,
    pub result: BatchResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::llm_client::{SystemBlock, ToolDef};

    fn request() -> LlmRequest {
        LlmRequest {
            model: "claude-sonnet-4-5".into(),
            max_tokens: 8192,
            system: vec![
                SystemBlock::plain("prefix"),
                SystemBlock::cached("big snapshot"),
            ],
            messages: vec![Message::user("hello")],
            tools: vec![ToolDef {
                name: "read_file".into(),
                description: "Read a file".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            thinking_budget: Some(4096),
        }
    }

    #[test]
    fn test_cache_marker_lands_on_one_block() {
        let params = MessageParams::from_request(&request());
        assert!(params.system[0].cache_control.is_none());
        assert!(params.system[1].cache_control.is_some());
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json.matches(r#""cache_control""#).count(), 1);
        assert!(json.contains(r#""type":"ephemeral""#));
    }

    #[test]
    fn test_thinking_widens_max_tokens() {
        let params = MessageParams::from_request(&request());
        assert_eq!(params.max_tokens, 8192 + 4096);
        assert_eq!(params.thinking.as_ref().unwrap().budget_tokens, 4096);

        let mut no_thinking = request();
        no_thinking.thinking_budget = None;
        let params = MessageParams::from_request(&no_thinking);
        assert_eq!(params.max_tokens, 8192);
        assert!(params.thinking.is_none());
    }

    #[test]
    fn test_result_line_parses_succeeded() {
        let line = r#"{
            "custom_id": "req_0",
            "result": {
                "type": "succeeded",
                "message": {
                    "content": [{"type": "text", "text": "hi"}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 3, "output_tokens": 5}
                }
            }
        }"#;
        let parsed: BatchResultLine = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.result.result_type, "succeeded");
        let message = parsed.result.message.unwrap();
        assert_eq!(message.usage.output_tokens, 5);
    }

    #[test]
    fn test_result_line_parses_errored() {
        let line = r#"{
            "custom_id": "req_0",
            "result": {
                "type": "errored",
                "error": {"type": "invalid_request", "message": "too long"}
            }
        }"#;
        let parsed: BatchResultLine = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.result.result_type, "errored");
        assert!(parsed.result.message.is_none());
    }
}
