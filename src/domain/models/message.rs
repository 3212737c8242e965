//! Conversation messages exchanged with the model.
//!
//! Content is either a plain string or an ordered list of typed blocks.
//! Tool invocations arrive as `tool_use` blocks in assistant turns and are
//! answered by `tool_result` blocks in the following user turn.

use serde::{Deserialize, Serialize};

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// All blocks in this message (a plain string counts as one text block).
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            MessageContent::Text(s) => vec![ContentBlock::Text { text: s.clone() }],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// Message content: a plain string or structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

/// Content block in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Opaque chain-of-thought. The signature is vendor-signed and
    /// unverifiable after the fact; it is stripped before persistence.
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: None,
        }
    }

    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: Some(true),
        }
    }
}

/// Drop `signature` fields from thinking blocks.
///
/// Applied to every response before it is persisted; signatures are only
/// meaningful to the vendor within the originating conversation.
pub fn strip_thinking_signatures(blocks: &mut [ContentBlock]) {
    for block in blocks {
        if let ContentBlock::Thinking { signature, .. } = block {
            *signature = None;
        }
    }
}

/// Concatenated text of all text blocks in a message.
pub fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_content_serializes_bare() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""content":"hello""#));
    }

    #[test]
    fn test_block_content_round_trip() {
        let msg = Message::assistant(vec![
            ContentBlock::text("working on it"),
            ContentBlock::ToolUse {
                id: "tu_1".into(),
                name: "read_file".into(),
                input: json!({"filePath": "src/main.rs"}),
            },
        ]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_strip_thinking_signatures() {
        let mut blocks = vec![
            ContentBlock::Thinking {
                thinking: "considering".into(),
                signature: Some("sig_abc".into()),
            },
            ContentBlock::text("done"),
        ];
        strip_thinking_signatures(&mut blocks);
        match &blocks[0] {
            ContentBlock::Thinking { signature, .. } => assert!(signature.is_none()),
            other => panic!("unexpected block: {other:?}"),
        }
        let json = serde_json::to_string(&blocks).unwrap();
        assert!(!json.contains("signature"));
    }

    #[test]
    fn test_text_of_skips_non_text_blocks() {
        let blocks = vec![
            ContentBlock::text("a"),
            ContentBlock::tool_result("tu_1", "ok"),
            ContentBlock::text("b"),
        ];
        assert_eq!(text_of(&blocks), "a\nb");
    }
}
