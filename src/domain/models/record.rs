//! Persisted record of one LLM exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{ContentBlock, Message};
use super::usage::TokenUsage;

/// Labeled LLM invocation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planner,
    Builder,
    Fixer,
    Reflect,
    Memory,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Builder => "builder",
            Self::Fixer => "fixer",
            Self::Reflect => "reflect",
            Self::Memory => "memory",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planner" => Some(Self::Planner),
            "builder" => Some(Self::Builder),
            "fixer" => Some(Self::Fixer),
            "reflect" => Some(Self::Reflect),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Phases that run with extended thinking enabled.
    pub fn uses_thinking(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per LLM exchange; created by the gateway, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedRecord {
    pub id: i64,
    pub phase: Phase,
    pub model_id: String,
    pub iteration_id: Uuid,
    pub system_blocks: Vec<String>,
    pub messages: Vec<Message>,
    /// Response blocks with thinking signatures stripped.
    pub response: Vec<ContentBlock>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_5m_tokens: u64,
    pub cache_write_1h_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost: f64,
    pub batch: bool,
    pub stop_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`GeneratedRecord`] (id and timestamp assigned by the store).
#[derive(Debug, Clone)]
pub struct NewGeneratedRecord {
    pub phase: Phase,
    pub model_id: String,
    pub iteration_id: Uuid,
    pub system_blocks: Vec<String>,
    pub messages: Vec<Message>,
    pub response: Vec<ContentBlock>,
    pub usage: TokenUsage,
    pub cost: f64,
    pub batch: bool,
    pub stop_reason: Option<String>,
}
