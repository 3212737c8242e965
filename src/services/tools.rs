//! Tool registry: the model-facing ABI.
//!
//! One registry maps tool names to argument schemas and handlers, built
//! once at startup. Unknown names are rejected before dispatch. Handler
//! failures are returned to the caller as errors; the patch session folds
//! them into `is_error` tool results so the model can recover.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{EditOperation, IdeaStatus};
use crate::domain::ports::{RecordStore, SourceControl, ToolDef};
use crate::services::memory_service::MemoryService;

/// Caps on search output so tool results stay model-sized.
const MAX_SEARCH_RESULTS: usize = 50;
const MAX_FILE_BYTES: u64 = 512 * 1024;

/// Terminal tool names: the dialog drivers intercept these.
pub const SUBMIT_PLAN: &str = "submit_plan";
pub const SUBMIT_EDITS: &str = "submit_edits";

/// Shared collaborators behind the tool handlers.
pub struct ToolDeps {
    pub workspace: Arc<dyn SourceControl>,
    pub memory: Arc<MemoryService>,
    pub store: Arc<dyn RecordStore>,
}

pub struct ToolRegistry {
    deps: ToolDeps,
    defs: HashMap<String, ToolDef>,
    builder_names: Vec<&'static str>,
    planner_names: Vec<&'static str>,
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDef {
    ToolDef {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

impl ToolRegistry {
    pub fn new(deps: ToolDeps) -> Self {
        let all = Self::definitions();
        let defs: HashMap<String, ToolDef> =
            all.into_iter().map(|d| (d.name.clone(), d)).collect();

        let builder_names = vec![
            "read_file",
            "grep_search",
            "file_search",
            "list_directory",
            "git_diff",
            "edit_file",
            "create_file",
            "delete_file",
            "recall",
            "recall_by_id",
            "store_note",
            "dismiss_note",
            "store_idea",
            "update_idea_status",
            SUBMIT_EDITS,
        ];
        let mut planner_names = vec![
            "read_file",
            "grep_search",
            "file_search",
            "list_directory",
            "git_diff",
            "recall",
            "recall_by_id",
            "store_note",
            "dismiss_note",
            "store_idea",
            "update_idea_status",
        ];
        planner_names.extend([
            "query_iteration_history",
            "query_performance_metrics",
            "code_quality",
            SUBMIT_PLAN,
        ]);

        Self {
            deps,
            defs,
            builder_names,
            planner_names,
        }
    }

    fn definitions() -> Vec<ToolDef> {
        vec![
            tool(
                "read_file",
                "Read a file from the workspace, optionally a line range.",
                object_schema(
                    json!({
                        "filePath": {"type": "string"},
                        "startLine": {"type": "integer"},
                        "endLine": {"type": "integer"},
                    }),
                    &["filePath"],
                ),
            ),
            tool(
                "grep_search",
                "Search file contents for a string, optionally limited to a filename pattern.",
                object_schema(
                    json!({
                        "query": {"type": "string"},
                        "includePattern": {"type": "string"},
                    }),
                    &["query"],
                ),
            ),
            tool(
                "file_search",
                "Find files whose path contains the query.",
                object_schema(json!({"query": {"type": "string"}}), &["query"]),
            ),
            tool(
                "list_directory",
                "List the entries of a workspace directory.",
                object_schema(json!({"path": {"type": "string"}}), &["path"]),
            ),
            tool(
                "git_diff",
                "Show the current diff against main (created/deleted files summarized).",
                object_schema(json!({}), &[]),
            ),
            tool(
                "edit_file",
                "Replace one exact occurrence of oldString with newString in a file.",
                object_schema(
                    json!({
                        "filePath": {"type": "string"},
                        "oldString": {"type": "string"},
                        "newString": {"type": "string"},
                    }),
                    &["filePath", "oldString", "newString"],
                ),
            ),
            tool(
                "create_file",
                "Create a file with the given content.",
                object_schema(
                    json!({
                        "filePath": {"type": "string"},
                        "content": {"type": "string"},
                    }),
                    &["filePath", "content"],
                ),
            ),
            tool(
                "delete_file",
                "Delete a file.",
                object_schema(json!({"filePath": {"type": "string"}}), &["filePath"]),
            ),
            tool(
                "recall",
                "Search stored memories.",
                object_schema(json!({"query": {"type": "string"}}), &["query"]),
            ),
            tool(
                "recall_by_id",
                "Fetch one memory by id.",
                object_schema(json!({"id": {"type": "integer"}}), &["id"]),
            ),
            tool(
                "store_note",
                "Save a pinned note to self.",
                object_schema(json!({"content": {"type": "string"}}), &["content"]),
            ),
            tool(
                "dismiss_note",
                "Unpin a note so it stops appearing in the active context.",
                object_schema(json!({"id": {"type": "integer"}}), &["id"]),
            ),
            tool(
                "store_idea",
                "Save an improvement idea with optional context.",
                object_schema(
                    json!({
                        "description": {"type": "string"},
                        "context": {"type": "string"},
                    }),
                    &["description"],
                ),
            ),
            tool(
                "update_idea_status",
                "Mark an idea attempted or completed.",
                object_schema(
                    json!({
                        "id": {"type": "integer"},
                        "status": {"type": "string", "enum": ["attempted", "completed"]},
                    }),
                    &["id", "status"],
                ),
            ),
            tool(
                "query_iteration_history",
                "Summaries of recent iterations.",
                object_schema(json!({"limit": {"type": "integer"}}), &[]),
            ),
            tool(
                "query_performance_metrics",
                "Aggregate cost/token metrics over recent LLM usage. Metric: cost | tokens | models.",
                object_schema(
                    json!({
                        "metric": {"type": "string", "enum": ["cost", "tokens", "models"]},
                        "limit": {"type": "integer"},
                    }),
                    &["metric"],
                ),
            ),
            tool(
                "code_quality",
                "Quick quality heuristics for one file.",
                object_schema(json!({"filePath": {"type": "string"}}), &["filePath"]),
            ),
            tool(
                SUBMIT_PLAN,
                "Submit the chosen plan. Terminal: call exactly once, then stop.",
                object_schema(
                    json!({
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                    }),
                    &["title", "description"],
                ),
            ),
            tool(
                SUBMIT_EDITS,
                "Submit the final list of edit operations. Terminal.",
                object_schema(
                    json!({
                        "operations": {"type": "array", "items": {"type": "object"}},
                    }),
                    &["operations"],
                ),
            ),
        ]
    }

    /// The workspace behind the edit tools (the session applies
    /// submit_edits operations through it).
    pub fn workspace(&self) -> Arc<dyn SourceControl> {
        self.deps.workspace.clone()
    }

    fn named(&self, names: &[&str]) -> Vec<ToolDef> {
        names
            .iter()
            .filter_map(|name| self.defs.get(*name).cloned())
            .collect()
    }

    pub fn builder_tools(&self) -> Vec<ToolDef> {
        self.named(&self.builder_names)
    }

    pub fn planner_tools(&self) -> Vec<ToolDef> {
        self.named(&self.planner_names)
    }

    /// Run one tool call. Unknown names fail before dispatch.
    pub async fn execute(&self, name: &str, input: &Value) -> AgentResult<String> {
        if !self.defs.contains_key(name) {
            return Err(AgentError::ToolUsage(format!("unknown tool: {name}")));
        }
        match name {
            "read_file" => self.read_file(input).await,
            "grep_search" => self.grep_search(input),
            "file_search" => self.file_search(input),
            "list_directory" => self.list_directory(input),
            "git_diff" => self.deps.workspace.diff().await,
            "edit_file" | "create_file" | "delete_file" => {
                let op = edit_operation_from_input(name, input)?;
                let described = format!("{} {}", op.verb(), op.path());
                self.deps.workspace.apply_edits(&[op]).await?;
                Ok(format!("ok: {described}"))
            }
            "recall" => {
                let query = required_str(input, "query")?;
                self.deps.memory.recall(query).await
            }
            "recall_by_id" => {
                let id = required_id(input)?;
                self.deps.memory.recall_by_id(id).await
            }
            "store_note" => {
                let content = required_str(input, "content")?;
                self.deps.memory.store_pinned(content).await
            }
            "dismiss_note" => {
                let id = required_id(input)?;
                self.deps.memory.unpin(id).await?;
                Ok(format!("Note {id} unpinned."))
            }
            "store_idea" => {
                let description = required_str(input, "description")?;
                let context = optional_str(input, "context").unwrap_or_default();
                self.deps.memory.store_idea(description, context).await
            }
            "update_idea_status" => {
                let id = required_id(input)?;
                let status_raw = required_str(input, "status")?;
                let status = match IdeaStatus::from_str(status_raw) {
                    Some(IdeaStatus::Pending) | None => {
                        return Err(AgentError::ToolUsage(format!(
                            "status must be attempted or completed, got {status_raw:?}"
                        )))
                    }
                    Some(status) => status,
                };
                self.deps.memory.update_idea_status(id, status).await?;
                Ok(format!("Idea {id} marked {}.", status.as_str()))
            }
            "query_iteration_history" => self.iteration_history(input).await,
            "query_performance_metrics" => self.performance_metrics(input).await,
            "code_quality" => self.code_quality(input).await,
            SUBMIT_PLAN | SUBMIT_EDITS => Err(AgentError::ToolUsage(format!(
                "{name} is terminal and handled by the dialog driver"
            ))),
            other => Err(AgentError::ToolUsage(format!("unknown tool: {other}"))),
        }
    }

    fn resolve(&self, relative: &str) -> AgentResult<PathBuf> {
        if relative.is_empty()
            || Path::new(relative).is_absolute()
            || relative.split('/').any(|seg| seg == "..")
        {
            return Err(AgentError::ToolUsage(format!(
                "path must be workspace-relative: {relative:?}"
            )));
        }
        Ok(self.deps.workspace.root().join(relative))
    }

    async fn read_file(&self, input: &Value) -> AgentResult<String> {
        let path = self.resolve(required_str(input, "filePath")?)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolUsage(format!("cannot read file: {e}")))?;
        let start = optional_u64(input, "startLine").unwrap_or(1).max(1) as usize;
        let end = optional_u64(input, "endLine").unwrap_or(u64::MAX) as usize;
        let lines: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i + 1 >= start && *i + 1 <= end)
            .map(|(_, line)| line)
            .collect();
        Ok(lines.join("\n"))
    }

    fn grep_search(&self, input: &Value) -> AgentResult<String> {
        let query = required_str(input, "query")?;
        let include = optional_str(input, "includePattern");
        let mut matches = Vec::new();
        for file in walk_files(self.deps.workspace.root()) {
            let relative = file
                .strip_prefix(self.deps.workspace.root())
                .unwrap_or(&file)
                .to_string_lossy()
                .to_string();
            if let Some(pattern) = include {
                if !glob_match(pattern, &relative) {
                    continue;
                }
            }
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (line_no, line) in content.lines().enumerate() {
                if line.contains(query) {
                    matches.push(format!("{relative}:{}: {}", line_no + 1, line.trim_end()));
                    if matches.len() >= MAX_SEARCH_RESULTS {
                        matches.push("(more matches elided)".to_string());
                        return Ok(matches.join("\n"));
                    }
                }
            }
        }
        if matches.is_empty() {
            return Ok("No matches.".to_string());
        }
        Ok(matches.join("\n"))
    }

    fn file_search(&self, input: &Value) -> AgentResult<String> {
        let query = required_str(input, "query")?;
        let root = self.deps.workspace.root();
        let mut found: Vec<String> = walk_files(root)
            .into_iter()
            .filter_map(|file| {
                let relative = file.strip_prefix(root).ok()?.to_string_lossy().to_string();
                relative.contains(query).then_some(relative)
            })
            .take(MAX_SEARCH_RESULTS)
            .collect();
        if found.is_empty() {
            return Ok("No files found.".to_string());
        }
        found.sort();
        Ok(found.join("\n"))
    }

    fn list_directory(&self, input: &Value) -> AgentResult<String> {
        let raw = required_str(input, "path")?;
        let path = if raw == "." {
            self.deps.workspace.root().to_path_buf()
        } else {
            self.resolve(raw)?
        };
        let entries = std::fs::read_dir(&path)
            .map_err(|e| AgentError::ToolUsage(format!("cannot list {raw:?}: {e}")))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() {
                    format!("{name}/")
                } else {
                    name
                }
            })
            .collect();
        names.sort();
        Ok(names.join("\n"))
    }

    async fn iteration_history(&self, input: &Value) -> AgentResult<String> {
        let limit = optional_u64(input, "limit").unwrap_or(5) as u32;
        let logs = self.deps.store.recent_iteration_logs(limit).await?;
        if logs.is_empty() {
            return Ok("No prior iterations.".to_string());
        }
        let rendered: Vec<String> = logs
            .iter()
            .map(|stored| {
                let last = stored
                    .log
                    .entries
                    .last()
                    .map(|e| e.message.as_str())
                    .unwrap_or("(no entries)");
                let cost: f64 = stored
                    .log
                    .token_usage
                    .as_ref()
                    .map(|usage| usage.values().map(|p| p.cost).sum())
                    .unwrap_or(0.0);
                format!(
                    "Iteration {} [{}]: {} entries, ${:.4} — {}",
                    stored.id,
                    stored.created_at.format("%Y-%m-%d %H:%M"),
                    stored.log.entries.len(),
                    cost,
                    last
                )
            })
            .collect();
        Ok(rendered.join("\n"))
    }

    async fn performance_metrics(&self, input: &Value) -> AgentResult<String> {
        let metric = required_str(input, "metric")?;
        let limit = optional_u64(input, "limit").unwrap_or(50) as u32;
        match metric {
            "cost" => {
                let costs = self.deps.store.cost_by_model(limit).await?;
                if costs.is_empty() {
                    return Ok("No recorded usage.".to_string());
                }
                Ok(costs
                    .iter()
                    .map(|(model, cost)| format!("{model}: ${cost:.4}"))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            "tokens" => {
                let records = self.deps.store.recent_generated(limit).await?;
                let input_tokens: u64 = records.iter().map(|r| r.input_tokens).sum();
                let output_tokens: u64 = records.iter().map(|r| r.output_tokens).sum();
                let cache_read: u64 = records.iter().map(|r| r.cache_read_tokens).sum();
                Ok(format!(
                    "last {} requests: {input_tokens} input, {output_tokens} output, \
                     {cache_read} cache-read",
                    records.len()
                ))
            }
            "models" => {
                let models = self.deps.store.distinct_models().await?;
                Ok(if models.is_empty() {
                    "No recorded usage.".to_string()
                } else {
                    models.join("\n")
                })
            }
            other => Err(AgentError::ToolUsage(format!(
                "unknown metric {other:?}; use cost, tokens, or models"
            ))),
        }
    }

    async fn code_quality(&self, input: &Value) -> AgentResult<String> {
        let path = self.resolve(required_str(input, "filePath")?)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolUsage(format!("cannot read file: {e}")))?;
        let lines = content.lines().count();
        let functions = content
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                trimmed.starts_with("fn ")
                    || trimmed.starts_with("pub fn ")
                    || trimmed.starts_with("async fn ")
                    || trimmed.starts_with("pub async fn ")
                    || trimmed.contains("function ")
            })
            .count();
        let todos = content.matches("TODO").count();
        let longest = content.lines().map(str::len).max().unwrap_or(0);
        Ok(format!(
            "{} lines, {} functions, {} TODOs, longest line {} chars",
            lines, functions, todos, longest
        ))
    }
}

/// Build an [`EditOperation`] from an edit-tool invocation.
pub fn edit_operation_from_input(name: &str, input: &Value) -> AgentResult<EditOperation> {
    let op = match name {
        "edit_file" => EditOperation::Replace {
            path: required_str(input, "filePath")?.to_string(),
            old_string: required_str(input, "oldString")?.to_string(),
            new_string: required_str(input, "newString")?.to_string(),
        },
        "create_file" => EditOperation::Create {
            path: required_str(input, "filePath")?.to_string(),
            content: required_str(input, "content")?.to_string(),
        },
        "delete_file" => EditOperation::Delete {
            path: required_str(input, "filePath")?.to_string(),
        },
        other => {
            return Err(AgentError::ToolUsage(format!(
                "{other} is not an edit tool"
            )))
        }
    };
    op.validate().map_err(AgentError::ToolUsage)?;
    Ok(op)
}

fn required_str<'a>(input: &'a Value, key: &str) -> AgentResult<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ToolUsage(format!("missing required argument: {key}")))
}

fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn optional_u64(input: &Value, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

/// Memory ids arrive as integers or numeric strings.
fn required_id(input: &Value) -> AgentResult<i64> {
    match input.get("id") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| AgentError::ToolUsage("id must be an integer".to_string())),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| AgentError::ToolUsage(format!("id must be an integer, got {s:?}"))),
        _ => Err(AgentError::ToolUsage(
            "missing required argument: id".to_string(),
        )),
    }
}

/// Directories never worth searching.
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".autograft"];

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if !SKIP_DIRS.contains(&name.as_str()) {
                    stack.push(path);
                }
            } else if entry.metadata().map(|m| m.len() <= MAX_FILE_BYTES).unwrap_or(false) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Minimal glob: `*` matches any run of characters, everything else is
/// literal. Matches against the full relative path.
fn glob_match(pattern: &str, path: &str) -> bool {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    regex::Regex::new(&regex)
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}
