//! SQLite implementation of the record store.
//!
//! Three tables: `generated` (LLM exchanges), `memories`, and
//! `iteration_logs`. Memory text search goes through an FTS5 shadow table
//! ranked by bm25; a regex scan over summary+content is the fallback.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{
    GeneratedRecord, IdeaStatus, IterationLog, MemoryItem, NewGeneratedRecord, NewMemoryItem,
    Phase, PhaseUsage, StoredIterationLog, TokenUsage,
};
use crate::domain::ports::{MemoryFilter, RecordStore};

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::StorageUnavailable(e.to_string())
}

fn parse_datetime(raw: &str) -> AgentResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_err(format!("bad timestamp {raw:?}: {e}")))
}

fn memory_from_row(row: &sqlx::sqlite::SqliteRow) -> AgentResult<MemoryItem> {
    let idea_status: Option<String> = row.get("idea_status");
    Ok(MemoryItem {
        id: row.get("id"),
        content: row.get("content"),
        summary: row.get("summary"),
        pinned: row.get::<i64, _>("pinned") != 0,
        idea_status: idea_status.as_deref().and_then(IdeaStatus::from_str),
        idea_context: row.get("idea_context"),
        created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str())?,
    })
}

/// Quote each term so user text cannot inject FTS5 query syntax.
fn fts_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

const MEMORY_COLUMNS: &str =
    "id, content, summary, pinned, idea_status, idea_context, created_at, updated_at";

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_generated(&self, record: NewGeneratedRecord) -> AgentResult<i64> {
        let system_blocks =
            serde_json::to_string(&record.system_blocks).map_err(storage_err)?;
        let messages = serde_json::to_string(&record.messages).map_err(storage_err)?;
        let response = serde_json::to_string(&record.response).map_err(storage_err)?;
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO generated (
                phase, model_id, iteration_id, system_blocks, messages, response,
                input_tokens, output_tokens, cache_write_5m_tokens,
                cache_write_1h_tokens, cache_read_tokens, cost, batch,
                stop_reason, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.phase.as_str())
        .bind(&record.model_id)
        .bind(record.iteration_id.to_string())
        .bind(system_blocks)
        .bind(messages)
        .bind(response)
        .bind(record.usage.input_tokens as i64)
        .bind(record.usage.output_tokens as i64)
        .bind(record.usage.cache_write_5m() as i64)
        .bind(record.usage.cache_write_1h() as i64)
        .bind(record.usage.cache_read_input_tokens as i64)
        .bind(record.cost)
        .bind(record.batch as i64)
        .bind(&record.stop_reason)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_generated(&self, limit: u32) -> AgentResult<Vec<GeneratedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, phase, model_id, iteration_id, system_blocks, messages,
                   response, input_tokens, output_tokens, cache_write_5m_tokens,
                   cache_write_1h_tokens, cache_read_tokens, cost, batch,
                   stop_reason, created_at
            FROM generated
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let phase_raw: String = row.get("phase");
                let iteration_raw: String = row.get("iteration_id");
                Ok(GeneratedRecord {
                    id: row.get("id"),
                    phase: Phase::from_str(&phase_raw)
                        .ok_or_else(|| storage_err(format!("unknown phase {phase_raw:?}")))?,
                    model_id: row.get("model_id"),
                    iteration_id: Uuid::parse_str(&iteration_raw).map_err(storage_err)?,
                    system_blocks: serde_json::from_str(row.get::<String, _>("system_blocks").as_str())
                        .map_err(storage_err)?,
                    messages: serde_json::from_str(row.get::<String, _>("messages").as_str())
                        .map_err(storage_err)?,
                    response: serde_json::from_str(row.get::<String, _>("response").as_str())
                        .map_err(storage_err)?,
                    input_tokens: row.get::<i64, _>("input_tokens") as u64,
                    output_tokens: row.get::<i64, _>("output_tokens") as u64,
                    cache_write_5m_tokens: row.get::<i64, _>("cache_write_5m_tokens") as u64,
                    cache_write_1h_tokens: row.get::<i64, _>("cache_write_1h_tokens") as u64,
                    cache_read_tokens: row.get::<i64, _>("cache_read_tokens") as u64,
                    cost: row.get("cost"),
                    batch: row.get::<i64, _>("batch") != 0,
                    stop_reason: row.get("stop_reason"),
                    created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }

    async fn phase_usage(&self, iteration_id: Uuid) -> AgentResult<HashMap<String, PhaseUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT phase,
                   COUNT(*) AS requests,
                   SUM(input_tokens) AS input_tokens,
                   SUM(output_tokens) AS output_tokens,
                   SUM(cache_read_tokens) AS cache_read_tokens,
                   SUM(cache_write_5m_tokens) AS cache_write_5m_tokens,
                   SUM(cache_write_1h_tokens) AS cache_write_1h_tokens,
                   SUM(cost) AS cost
            FROM generated
            WHERE iteration_id = ?
            GROUP BY phase
            "#,
        )
        .bind(iteration_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut usage = HashMap::new();
        for row in rows {
            let phase: String = row.get("phase");
            let mut token_usage = TokenUsage {
                input_tokens: row.get::<i64, _>("input_tokens") as u64,
                output_tokens: row.get::<i64, _>("output_tokens") as u64,
                cache_read_input_tokens: row.get::<i64, _>("cache_read_tokens") as u64,
                ..Default::default()
            };
            let write_5m = row.get::<i64, _>("cache_write_5m_tokens") as u64;
            let write_1h = row.get::<i64, _>("cache_write_1h_tokens") as u64;
            token_usage.cache_creation_input_tokens = write_5m + write_1h;
            token_usage.cache_creation = Some(crate::domain::models::CacheCreation {
                ephemeral_5m_input_tokens: write_5m,
                ephemeral_1h_input_tokens: write_1h,
            });
            usage.insert(
                phase,
                PhaseUsage {
                    requests: row.get::<i64, _>("requests") as u64,
                    usage: token_usage,
                    cost: row.get("cost"),
                },
            );
        }
        Ok(usage)
    }

    async fn cost_by_model(&self, limit: u32) -> AgentResult<Vec<(String, f64)>> {
        let rows = sqlx::query(
            r#"
            SELECT model_id, SUM(cost) AS cost
            FROM (
                SELECT model_id, cost FROM generated
                ORDER BY created_at DESC
                LIMIT ?
            )
            GROUP BY model_id
            ORDER BY cost DESC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("model_id"), row.get("cost")))
            .collect())
    }

    async fn insert_memory(&self, item: NewMemoryItem) -> AgentResult<MemoryItem> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO memories (
                content, summary, pinned, idea_status, idea_context,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.content)
        .bind(&item.summary)
        .bind(item.pinned as i64)
        .bind(item.idea_status.map(|s| s.as_str()))
        .bind(&item.idea_context)
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(MemoryItem {
            id: result.last_insert_rowid(),
            content: item.content,
            summary: item.summary,
            pinned: item.pinned,
            idea_status: item.idea_status,
            idea_context: item.idea_context,
            created_at: now,
            updated_at: now,
        })
    }

    async fn memory_by_id(&self, id: i64) -> AgentResult<Option<MemoryItem>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.as_ref().map(memory_from_row).transpose()
    }

    async fn list_memories(
        &self,
        filter: MemoryFilter,
        limit: u32,
    ) -> AgentResult<Vec<MemoryItem>> {
        let where_clause = match filter {
            MemoryFilter::Notes => "WHERE pinned = 1 AND idea_status IS NULL",
            MemoryFilter::ActiveIdeas => {
                "WHERE pinned = 1 AND idea_status IN ('pending', 'attempted')"
            }
            MemoryFilter::Past => {
                "WHERE pinned = 0 AND (idea_status IS NULL OR idea_status = 'completed')"
            }
            MemoryFilter::All => "",
        };

        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories {where_clause} \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(memory_from_row).collect()
    }

    async fn search_memories(&self, query: &str, limit: u32) -> AgentResult<Vec<MemoryItem>> {
        let match_expr = fts_query(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {MEMORY_COLUMNS}
            FROM memories
            WHERE id IN (
                SELECT rowid FROM memories_fts WHERE memories_fts MATCH ?
                ORDER BY bm25(memories_fts)
                LIMIT ?
            )
            ORDER BY created_at DESC
            "#
        ))
        .bind(&match_expr)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(memory_from_row).collect()
    }

    async fn regex_search_memories(
        &self,
        pattern: &str,
        limit: u32,
    ) -> AgentResult<Vec<MemoryItem>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| AgentError::ToolUsage(format!("invalid regex {pattern:?}: {e}")))?;

        let rows = sqlx::query(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut matches = Vec::new();
        for row in &rows {
            let item = memory_from_row(row)?;
            if re.is_match(&item.summary) || re.is_match(&item.content) {
                matches.push(item);
                if matches.len() >= limit as usize {
                    break;
                }
            }
        }
        Ok(matches)
    }

    async fn set_pinned(&self, id: i64, pinned: bool) -> AgentResult<()> {
        sqlx::query("UPDATE memories SET pinned = ?, updated_at = ? WHERE id = ?")
            .bind(pinned as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn set_idea_status(
        &self,
        id: i64,
        status: IdeaStatus,
        pinned: bool,
    ) -> AgentResult<()> {
        sqlx::query("UPDATE memories SET idea_status = ?, pinned = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(pinned as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_memories(&self, ids: &[i64]) -> AgentResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM memories WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await.map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_iteration_log(&self, log: &IterationLog) -> AgentResult<i64> {
        let entries = serde_json::to_string(&log.entries).map_err(storage_err)?;
        let token_usage = log
            .token_usage
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(storage_err)?;

        let result = sqlx::query(
            "INSERT INTO iteration_logs (entries, token_usage, created_at) VALUES (?, ?, ?)",
        )
        .bind(entries)
        .bind(token_usage)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_iteration_logs(&self, limit: u32) -> AgentResult<Vec<StoredIterationLog>> {
        let rows = sqlx::query(
            "SELECT id, entries, token_usage, created_at FROM iteration_logs \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|row| {
                let entries = serde_json::from_str(row.get::<String, _>("entries").as_str())
                    .map_err(storage_err)?;
                let token_usage = row
                    .get::<Option<String>, _>("token_usage")
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .map_err(storage_err)?;
                Ok(StoredIterationLog {
                    id: row.get("id"),
                    log: IterationLog {
                        entries,
                        token_usage,
                    },
                    created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }

    async fn distinct_models(&self) -> AgentResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT model_id FROM generated ORDER BY model_id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.iter().map(|row| row.get("model_id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::connection::DatabaseConnection;

    async fn store() -> SqliteRecordStore {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        SqliteRecordStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_memory_insert_and_get() {
        let store = store().await;
        let item = store
            .insert_memory(NewMemoryItem::pinned("full text", "short"))
            .await
            .unwrap();
        let found = store.memory_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(found.summary, "short");
        assert!(found.pinned);
        assert!(store.memory_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_memories_filters() {
        let store = store().await;
        store
            .insert_memory(NewMemoryItem::pinned("note body", "a note"))
            .await
            .unwrap();
        store
            .insert_memory(NewMemoryItem::idea("idea body", "an idea", None))
            .await
            .unwrap();
        store
            .insert_memory(NewMemoryItem::past("past body", "a past outcome"))
            .await
            .unwrap();

        let notes = store.list_memories(MemoryFilter::Notes, 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].summary, "a note");

        let ideas = store
            .list_memories(MemoryFilter::ActiveIdeas, 10)
            .await
            .unwrap();
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].summary, "an idea");

        let past = store.list_memories(MemoryFilter::Past, 10).await.unwrap();
        assert_eq!(past.len(), 1);
        assert_eq!(past[0].summary, "a past outcome");
    }

    #[tokio::test]
    async fn test_fts_search_and_regex_fallback() {
        let store = store().await;
        store
            .insert_memory(NewMemoryItem::past(
                "the build cache sped things up",
                "build cache win",
            ))
            .await
            .unwrap();
        store
            .insert_memory(NewMemoryItem::past("unrelated entry", "nothing here"))
            .await
            .unwrap();

        let hits = store.search_memories("cache", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].summary, "build cache win");

        // Substring that FTS tokenization misses but a regex scan finds.
        let none = store.search_memories("ach", 5).await.unwrap();
        assert!(none.is_empty());
        let regex_hits = store.regex_search_memories("ach", 5).await.unwrap();
        assert_eq!(regex_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_pin_and_idea_status_updates() {
        let store = store().await;
        let item = store
            .insert_memory(NewMemoryItem::idea("try x", "x idea", None))
            .await
            .unwrap();

        store
            .set_idea_status(item.id, IdeaStatus::Completed, false)
            .await
            .unwrap();
        let updated = store.memory_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(updated.idea_status, Some(IdeaStatus::Completed));
        assert!(!updated.pinned);
    }

    #[tokio::test]
    async fn test_generated_roundtrip_and_phase_usage() {
        let store = store().await;
        let iteration_id = Uuid::new_v4();
        let record = NewGeneratedRecord {
            phase: Phase::Planner,
            model_id: "claude-sonnet-4-5".into(),
            iteration_id,
            system_blocks: vec!["prefix".into()],
            messages: vec![crate::domain::models::Message::user("plan something")],
            response: vec![crate::domain::models::ContentBlock::text("a plan")],
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                cache_read_input_tokens: 10,
                cache_creation_input_tokens: 20,
                ..Default::default()
            },
            cost: 0.5,
            batch: true,
            stop_reason: Some("end_turn".into()),
        };
        store.insert_generated(record).await.unwrap();

        let recent = store.recent_generated(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].phase, Phase::Planner);
        assert!(recent[0].batch);
        assert_eq!(recent[0].cache_write_5m_tokens, 20);

        let usage = store.phase_usage(iteration_id).await.unwrap();
        let planner = usage.get("planner").unwrap();
        assert_eq!(planner.requests, 1);
        assert_eq!(planner.usage.input_tokens, 100);
        assert!((planner.cost - 0.5).abs() < f64::EPSILON);

        let models = store.distinct_models().await.unwrap();
        assert_eq!(models, vec!["claude-sonnet-4-5".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_memories() {
        let store = store().await;
        let a = store
            .insert_memory(NewMemoryItem::past("a", "a"))
            .await
            .unwrap();
        let b = store
            .insert_memory(NewMemoryItem::past("b", "b"))
            .await
            .unwrap();
        let deleted = store.delete_memories(&[a.id, b.id]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.memory_by_id(a.id).await.unwrap().is_none());
    }
}
