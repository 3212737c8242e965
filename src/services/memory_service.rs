//! Memory service: past outcomes, pinned notes, improvement ideas, and
//! the budgeted context string fed to the planner.

use std::sync::Arc;

use regex::escape;
use tracing::{instrument, warn};

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{text_of, IdeaStatus, MemoryItem, Message, NewMemoryItem, Phase};
use crate::domain::ports::{LlmGateway, MemoryFilter, RecordStore};
use crate::services::prompts::{ideas_prompt, summarize_prompt};

/// Upper bound on items fetched per context section.
const SECTION_FETCH_LIMIT: u32 = 100;

/// Recall returns at most this many items.
const RECALL_LIMIT: u32 = 5;

/// Tokens are estimated as ceil(chars / 4). Deliberately cheap; exact
/// tokenization is not a goal.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub struct MemoryService {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn LlmGateway>,
    /// Soft token budget for `get_context`.
    budget: usize,
}

impl MemoryService {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn LlmGateway>, budget: usize) -> Self {
        Self {
            store,
            gateway,
            budget,
        }
    }

    /// Produce a one-line summary via the memory phase.
    async fn summarize(&self, content: &str) -> AgentResult<String> {
        let response = self
            .gateway
            .complete(
                Phase::Memory,
                &[Message::user(summarize_prompt(content))],
                &[],
            )
            .await?;
        let summary = text_of(&response.content).trim().to_string();
        if summary.is_empty() {
            warn!("memory summarization returned empty text");
            let truncated: String = content.chars().take(80).collect();
            return Ok(truncated);
        }
        Ok(summary.lines().next().unwrap_or_default().to_string())
    }

    /// Store an unpinned past-outcome memory.
    #[instrument(skip(self, content), err)]
    pub async fn store_past(&self, content: &str) -> AgentResult<MemoryItem> {
        let summary = self.summarize(content).await?;
        self.store
            .insert_memory(NewMemoryItem::past(content, summary))
            .await
    }

    /// Store a pinned note. Returns the confirmation shown to the model.
    #[instrument(skip(self, content), err)]
    pub async fn store_pinned(&self, content: &str) -> AgentResult<String> {
        let summary = self.summarize(content).await?;
        let item = self
            .store
            .insert_memory(NewMemoryItem::pinned(content, summary))
            .await?;
        Ok(format!("Note saved ({}): {}", item.id, item.summary))
    }

    /// Store a pinned idea in `pending` state.
    #[instrument(skip(self, description, context), err)]
    pub async fn store_idea(&self, description: &str, context: &str) -> AgentResult<String> {
        let summary = self.summarize(description).await?;
        let idea_context = (!context.trim().is_empty()).then(|| context.to_string());
        let item = self
            .store
            .insert_memory(NewMemoryItem::idea(description, summary, idea_context))
            .await?;
        Ok(format!("Idea saved ({}): {}", item.id, item.summary))
    }

    /// Clear the pinned flag on a note.
    #[instrument(skip(self), err)]
    pub async fn unpin(&self, id: i64) -> AgentResult<()> {
        let item = self
            .store
            .memory_by_id(id)
            .await?
            .ok_or_else(|| AgentError::ToolUsage(format!("No memory with id \"{id}\".")))?;
        if !item.pinned {
            return Err(AgentError::ToolUsage(format!(
                "Memory {id} is not pinned."
            )));
        }
        self.store.set_pinned(id, false).await
    }

    /// Move an idea to `attempted` or `completed`; completing also unpins.
    #[instrument(skip(self), err)]
    pub async fn update_idea_status(&self, id: i64, status: IdeaStatus) -> AgentResult<()> {
        let item = self
            .store
            .memory_by_id(id)
            .await?
            .ok_or_else(|| AgentError::ToolUsage(format!("No memory with id \"{id}\".")))?;
        if !item.is_idea() {
            return Err(AgentError::ToolUsage(format!(
                "Memory {id} is not an idea."
            )));
        }
        let pinned = !matches!(status, IdeaStatus::Completed) && item.pinned;
        self.store.set_idea_status(id, status, pinned).await
    }

    /// Assemble the memory context under the soft token budget.
    ///
    /// Pinned notes are always included in full; ideas only if the whole
    /// section fits; past items one at a time until the budget runs out.
    #[instrument(skip(self), err)]
    pub async fn get_context(&self) -> AgentResult<String> {
        let notes = self
            .store
            .list_memories(MemoryFilter::Notes, SECTION_FETCH_LIMIT)
            .await?;
        let ideas = self
            .store
            .list_memories(MemoryFilter::ActiveIdeas, SECTION_FETCH_LIMIT)
            .await?;
        let past = self
            .store
            .list_memories(MemoryFilter::Past, SECTION_FETCH_LIMIT)
            .await?;

        let mut sections: Vec<String> = Vec::new();
        let mut used = 0usize;

        if !notes.is_empty() {
            let lines: Vec<String> = notes
                .iter()
                .map(|item| format!("- ({}) {}", item.id, item.summary))
                .collect();
            let section = format!("## Notes to self\n{}", lines.join("\n"));
            used += estimate_tokens(&section);
            sections.push(section);
        }

        if !ideas.is_empty() {
            let lines: Vec<String> = ideas
                .iter()
                .map(|item| {
                    let tag = item
                        .idea_status
                        .map(|s| s.tag())
                        .unwrap_or(IdeaStatus::Pending.tag());
                    let context = item
                        .idea_context
                        .as_deref()
                        .map(|c| format!(" — {c}"))
                        .unwrap_or_default();
                    format!("- {tag} ({}) {}{context}", item.id, item.summary)
                })
                .collect();
            let section = format!("## Ideas\n{}", lines.join("\n"));
            let section_tokens = estimate_tokens(&section);
            if used + section_tokens <= self.budget {
                used += section_tokens;
                sections.push(section);
            }
        }

        if !past.is_empty() {
            let mut lines: Vec<String> = Vec::new();
            let header_tokens = estimate_tokens("## Past\n");
            let mut section_used = header_tokens;
            for item in &past {
                let line = format!(
                    "- ({}) [{}] {}",
                    item.id,
                    item.created_at.format("%Y-%m-%d"),
                    item.summary
                );
                let line_tokens = estimate_tokens(&line);
                if used + section_used + line_tokens > self.budget {
                    break;
                }
                section_used += line_tokens;
                lines.push(line);
            }
            if !lines.is_empty() {
                sections.push(format!("## Past\n{}", lines.join("\n")));
            }
        }

        if sections.is_empty() {
            return Ok("No memories yet. This is your first run.".to_string());
        }
        Ok(sections.join("\n\n"))
    }

    fn format_recalled(items: &[MemoryItem]) -> String {
        items
            .iter()
            .map(|item| {
                format!(
                    "**{}** [{}]\n{}",
                    item.id,
                    item.created_at.format("%Y-%m-%d %H:%M:%S"),
                    item.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    /// Text-search the store; falls back to a case-insensitive regex scan
    /// when the text index yields nothing.
    #[instrument(skip(self), err)]
    pub async fn recall(&self, query: &str) -> AgentResult<String> {
        let mut items = self.store.search_memories(query, RECALL_LIMIT).await?;
        if items.is_empty() {
            items = self
                .store
                .regex_search_memories(&escape(query), RECALL_LIMIT)
                .await?;
        }
        if items.is_empty() {
            return Ok("No memories found.".to_string());
        }
        Ok(Self::format_recalled(&items))
    }

    #[instrument(skip(self), err)]
    pub async fn recall_by_id(&self, id: i64) -> AgentResult<String> {
        match self.store.memory_by_id(id).await? {
            Some(item) => Ok(Self::format_recalled(std::slice::from_ref(&item))),
            None => Ok(format!("No memory with id \"{id}\".")),
        }
    }

    /// Ask the model for improvement ideas over recent outcomes.
    ///
    /// Returned, never stored; the caller decides what to keep.
    #[instrument(skip(self), err)]
    pub async fn generate_ideas(&self) -> AgentResult<Vec<String>> {
        let recent = self
            .store
            .list_memories(MemoryFilter::Past, 20)
            .await?;
        let digest = recent
            .iter()
            .map(|item| format!("- {}", item.summary))
            .collect::<Vec<_>>()
            .join("\n");
        let response = self
            .gateway
            .complete(Phase::Memory, &[Message::user(ideas_prompt(&digest))], &[])
            .await?;
        Ok(text_of(&response.content)
            .lines()
            .map(|line| line.trim_start_matches('-').trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
