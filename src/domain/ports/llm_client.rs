//! Vendor-facing LLM port: batch submit and poll.
//!
//! The gateway speaks to the model vendor exclusively through this trait.
//! Requests carry an ordered list of system blocks; exactly one block may
//! carry the ephemeral cache marker, and any byte change before the marker
//! invalidates the vendor-side prompt cache.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::AgentResult;
use crate::domain::models::{ContentBlock, Message, TokenUsage};

/// One block of the layered system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
    /// Attach the vendor's ephemeral cache marker to this block.
    pub cache_marker: bool,
}

impl SystemBlock {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_marker: false,
        }
    }

    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_marker: true,
        }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A fully assembled model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: Vec<SystemBlock>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDef>,
    /// Extended-thinking budget; `None` disables thinking.
    pub thinking_budget: Option<u32>,
}

/// The assistant turn extracted from a finished request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Observed state of a submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    /// Still processing; poll again later.
    InProgress,
    Succeeded(LlmResponse),
    /// Terminal non-success (errored / canceled / expired), with detail.
    Failed(String),
}

/// Batch-mode access to the model vendor.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Submit a single-element batch; returns the vendor batch id.
    async fn submit(&self, request: &LlmRequest) -> AgentResult<String>;

    /// Poll a batch for completion.
    async fn poll(&self, batch_id: &str) -> AgentResult<BatchState>;
}
