//! Domain models.

pub mod edit;
pub mod iteration;
pub mod memory;
pub mod message;
pub mod plan;
pub mod record;
pub mod usage;

pub use edit::EditOperation;
pub use iteration::{IterationLog, LogEntry, LogLevel, PhaseUsage, StoredIterationLog};
pub use memory::{IdeaStatus, MemoryItem, NewMemoryItem};
pub use message::{
    strip_thinking_signatures, text_of, ContentBlock, Message, MessageContent, Role,
};
pub use plan::Plan;
pub use record::{GeneratedRecord, NewGeneratedRecord, Phase};
pub use usage::{CacheCreation, TokenUsage};
