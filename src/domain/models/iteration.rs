//! Iteration logs: the durable trace of one plan→build→merge attempt.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::usage::TokenUsage;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// One entry in an iteration log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Ordered log entries plus an optional per-phase usage summary.
///
/// Created once, at iteration end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationLog {
    pub entries: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<HashMap<String, PhaseUsage>>,
}

impl IterationLog {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push(LogEntry::new(level, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }
}

/// Aggregated usage and cost for one phase of an iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseUsage {
    pub requests: u64,
    pub usage: TokenUsage,
    pub cost: f64,
}

/// A persisted iteration log with its storage identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIterationLog {
    pub id: i64,
    pub log: IterationLog,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_accumulates_in_order() {
        let mut log = IterationLog::default();
        log.info("planned");
        log.warn("ci failed");
        log.error("gave up");
        assert_eq!(log.entries.len(), 3);
        assert_eq!(log.entries[0].level, LogLevel::Info);
        assert_eq!(log.entries[2].message, "gave up");
    }

    #[test]
    fn test_entry_context_serialization() {
        let entry = LogEntry::new(LogLevel::Info, "pushed")
            .with_context(serde_json::json!({"branch": "autograft/add-greet"}));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("autograft/add-greet"));
    }
}
