//! Persistence port: schema-validated storage with indexed retrieval.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::AgentResult;
use crate::domain::models::{
    GeneratedRecord, IdeaStatus, IterationLog, MemoryItem, NewGeneratedRecord, NewMemoryItem,
    PhaseUsage, StoredIterationLog,
};

/// Filter for memory listings. All listings return newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFilter {
    /// Pinned notes without an idea status.
    Notes,
    /// Pinned ideas in pending/attempted state.
    ActiveIdeas,
    /// Unpinned items that are not active ideas (completed ideas land
    /// here once their pin clears): the lossy tail of the context.
    Past,
    /// Everything.
    All,
}

/// Durable store for LLM exchanges, memory items, and iteration logs.
///
/// Writes are durable before the call returns; reads are monotonic within
/// one iteration (read-your-writes through a single pool). All operations
/// may fail with `StorageUnavailable`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one LLM exchange. Returns the assigned row id.
    async fn insert_generated(&self, record: NewGeneratedRecord) -> AgentResult<i64>;

    /// Most recent exchanges, newest first.
    async fn recent_generated(&self, limit: u32) -> AgentResult<Vec<GeneratedRecord>>;

    /// Token/cost aggregates grouped by phase for one iteration.
    async fn phase_usage(&self, iteration_id: Uuid) -> AgentResult<HashMap<String, PhaseUsage>>;

    /// Sum of recorded cost grouped by model id, newest `limit` exchanges.
    async fn cost_by_model(&self, limit: u32) -> AgentResult<Vec<(String, f64)>>;

    async fn insert_memory(&self, item: NewMemoryItem) -> AgentResult<MemoryItem>;

    async fn memory_by_id(&self, id: i64) -> AgentResult<Option<MemoryItem>>;

    async fn list_memories(&self, filter: MemoryFilter, limit: u32) -> AgentResult<Vec<MemoryItem>>;

    /// Full-text search over content+summary, best match first.
    async fn search_memories(&self, query: &str, limit: u32) -> AgentResult<Vec<MemoryItem>>;

    /// Case-insensitive regex scan over summary+content; the fallback when
    /// the text index yields no hits.
    async fn regex_search_memories(&self, pattern: &str, limit: u32)
        -> AgentResult<Vec<MemoryItem>>;

    async fn set_pinned(&self, id: i64, pinned: bool) -> AgentResult<()>;

    async fn set_idea_status(&self, id: i64, status: IdeaStatus, pinned: bool) -> AgentResult<()>;

    async fn delete_memories(&self, ids: &[i64]) -> AgentResult<u64>;

    async fn insert_iteration_log(&self, log: &IterationLog) -> AgentResult<i64>;

    /// Most recent iteration logs, newest first.
    async fn recent_iteration_logs(&self, limit: u32) -> AgentResult<Vec<StoredIterationLog>>;

    /// Distinct model ids seen across recorded exchanges.
    async fn distinct_models(&self) -> AgentResult<Vec<String>>;
}

#[cfg(test)]
mockall::mock! {
    pub Store {}

    #[async_trait]
    impl RecordStore for Store {
        async fn insert_generated(&self, record: NewGeneratedRecord) -> AgentResult<i64>;
        async fn recent_generated(&self, limit: u32) -> AgentResult<Vec<GeneratedRecord>>;
        async fn phase_usage(&self, iteration_id: Uuid) -> AgentResult<HashMap<String, PhaseUsage>>;
        async fn cost_by_model(&self, limit: u32) -> AgentResult<Vec<(String, f64)>>;
        async fn insert_memory(&self, item: NewMemoryItem) -> AgentResult<MemoryItem>;
        async fn memory_by_id(&self, id: i64) -> AgentResult<Option<MemoryItem>>;
        async fn list_memories(&self, filter: MemoryFilter, limit: u32) -> AgentResult<Vec<MemoryItem>>;
        async fn search_memories(&self, query: &str, limit: u32) -> AgentResult<Vec<MemoryItem>>;
        async fn regex_search_memories(&self, pattern: &str, limit: u32) -> AgentResult<Vec<MemoryItem>>;
        async fn set_pinned(&self, id: i64, pinned: bool) -> AgentResult<()>;
        async fn set_idea_status(&self, id: i64, status: IdeaStatus, pinned: bool) -> AgentResult<()>;
        async fn delete_memories(&self, ids: &[i64]) -> AgentResult<u64>;
        async fn insert_iteration_log(&self, log: &IterationLog) -> AgentResult<i64>;
        async fn recent_iteration_logs(&self, limit: u32) -> AgentResult<Vec<StoredIterationLog>>;
        async fn distinct_models(&self) -> AgentResult<Vec<String>>;
    }
}
