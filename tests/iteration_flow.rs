//! End-to-end iteration scenarios with scripted model and CI behavior.
//!
//! The gateway and forge are stubbed; the record store, memory service,
//! tool registry, patch session, and controller are the real ones.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use autograft::application::{ControllerDeps, IterationController};
use autograft::domain::errors::AgentResult;
use autograft::domain::models::{
    ContentBlock, EditOperation, Message, Phase, TokenUsage,
};
use autograft::domain::ports::{
    AgentPr, CheckOutcome, CiBridge, IterationContext, LlmGateway, LlmResponse, MemoryFilter,
    RecordStore, SourceControl, ToolDef,
};
use autograft::infrastructure::database::{DatabaseConnection, SqliteRecordStore};
use autograft::services::{MemoryService, ToolDeps, ToolRegistry};

/// Ordered record of externally visible actions, for gating assertions.
type Events = Arc<Mutex<Vec<String>>>;

struct StubGateway {
    turns: Mutex<HashMap<Phase, VecDeque<Vec<ContentBlock>>>>,
}

impl StubGateway {
    fn new(scripts: Vec<(Phase, Vec<Vec<ContentBlock>>)>) -> Self {
        let mut turns: HashMap<Phase, VecDeque<Vec<ContentBlock>>> = HashMap::new();
        for (phase, phase_turns) in scripts {
            turns.entry(phase).or_default().extend(phase_turns);
        }
        Self {
            turns: Mutex::new(turns),
        }
    }
}

#[async_trait]
impl LlmGateway for StubGateway {
    async fn complete(
        &self,
        phase: Phase,
        _messages: &[Message],
        _extra_tools: &[ToolDef],
    ) -> AgentResult<LlmResponse> {
        let scripted = self
            .turns
            .lock()
            .unwrap()
            .get_mut(&phase)
            .and_then(VecDeque::pop_front);
        let content = scripted.unwrap_or_else(|| match phase {
            Phase::Memory => vec![ContentBlock::text("summary")],
            Phase::Reflect => vec![ContentBlock::text("reflection text")],
            _ => vec![ContentBlock::text("done")],
        });
        Ok(LlmResponse {
            content,
            stop_reason: Some("end_turn".into()),
            usage: TokenUsage::default(),
        })
    }

    async fn begin_iteration(&self, _iteration_id: Uuid, _context: IterationContext) {}
    async fn end_iteration(&self) {}
}

struct StubWorkspace {
    root: PathBuf,
    events: Events,
    commits: Mutex<u32>,
}

#[async_trait]
impl SourceControl for StubWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }
    async fn clone_repo(&self) -> AgentResult<()> {
        Ok(())
    }
    async fn create_branch(&self, title: &str) -> AgentResult<String> {
        let branch = format!(
            "autograft/{}",
            title.to_lowercase().replace(' ', "-")
        );
        self.events.lock().unwrap().push(format!("branch:{branch}"));
        Ok(branch)
    }
    async fn apply_edits(&self, operations: &[EditOperation]) -> AgentResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("apply:{}", operations.len()));
        Ok(())
    }
    async fn commit_and_push(&self, _message: &str, _force: bool) -> AgentResult<()> {
        *self.commits.lock().unwrap() += 1;
        self.events.lock().unwrap().push("push".to_string());
        Ok(())
    }
    async fn reset_to_main(&self) -> AgentResult<()> {
        Ok(())
    }
    async fn head_sha(&self) -> AgentResult<String> {
        Ok("headsha".to_string())
    }
    async fn recent_log(&self, _n: u32) -> AgentResult<String> {
        Ok("abc1234 initial commit".to_string())
    }
    async fn reset_workspace(&self) -> AgentResult<()> {
        self.events.lock().unwrap().push("reset".to_string());
        Ok(())
    }
    async fn diff(&self) -> AgentResult<String> {
        Ok("diff --git a/x b/x".to_string())
    }
}

struct StubCi {
    events: Events,
    outcomes: Mutex<VecDeque<CheckOutcome>>,
}

#[async_trait]
impl CiBridge for StubCi {
    async fn open_pr(&self, _branch: &str, _title: &str, _body: &str) -> AgentResult<u64> {
        self.events.lock().unwrap().push("open_pr:1".to_string());
        Ok(1)
    }
    async fn merge_pr(&self, number: u64) -> AgentResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("merge:{number}"));
        Ok(())
    }
    async fn close_pr(&self, number: u64) -> AgentResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("close:{number}"));
        Ok(())
    }
    async fn delete_remote_branch(&self, name: &str) -> AgentResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("delete_branch:{name}"));
        Ok(())
    }
    async fn find_open_agent_prs(&self) -> AgentResult<Vec<AgentPr>> {
        Ok(vec![])
    }
    async fn await_checks(&self, _sha: &str) -> AgentResult<CheckOutcome> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(CheckOutcome::passed);
        self.events.lock().unwrap().push(format!(
            "checks:{}",
            if outcome.passed { "pass" } else { "fail" }
        ));
        Ok(outcome)
    }
    async fn latest_main_coverage(&self) -> AgentResult<Option<String>> {
        Ok(None)
    }
}

struct Harness {
    controller: IterationController,
    store: Arc<dyn RecordStore>,
    events: Events,
    commits: Arc<StubWorkspace>,
    _tmp: tempfile::TempDir,
}

async fn harness(
    gateway: StubGateway,
    ci_outcomes: Vec<CheckOutcome>,
    max_fix_attempts: u32,
) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let events: Events = Arc::new(Mutex::new(Vec::new()));

    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db.pool().clone()));

    let gateway: Arc<dyn LlmGateway> = Arc::new(gateway);
    let memory = Arc::new(MemoryService::new(store.clone(), gateway.clone(), 2000));
    let workspace = Arc::new(StubWorkspace {
        root: tmp.path().to_path_buf(),
        events: events.clone(),
        commits: Mutex::new(0),
    });
    let ci = Arc::new(StubCi {
        events: events.clone(),
        outcomes: Mutex::new(ci_outcomes.into()),
    });
    let tools = Arc::new(ToolRegistry::new(ToolDeps {
        workspace: workspace.clone(),
        memory: memory.clone(),
        store: store.clone(),
    }));

    let controller = IterationController::new(
        ControllerDeps {
            gateway,
            memory,
            workspace: workspace.clone(),
            ci,
            store: store.clone(),
            tools,
        },
        max_fix_attempts,
    );

    Harness {
        controller,
        store,
        events,
        commits: workspace,
        _tmp: tmp,
    }
}

fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

fn planner_script() -> (Phase, Vec<Vec<ContentBlock>>) {
    (
        Phase::Planner,
        vec![vec![tool_use(
            "tu_plan",
            "submit_plan",
            json!({"title": "Add greet", "description": "Adds a greet helper."}),
        )]],
    )
}

fn builder_creates_file() -> (Phase, Vec<Vec<ContentBlock>>) {
    (
        Phase::Builder,
        vec![
            vec![tool_use(
                "tu_create",
                "create_file",
                json!({"filePath": "src/greet.ts", "content": "export const g=()=>1"}),
            )],
            vec![ContentBlock::text("Change complete.")],
        ],
    )
}

fn fixer_round(id: &str) -> Vec<Vec<ContentBlock>> {
    vec![
        vec![tool_use(
            id,
            "edit_file",
            json!({
                "filePath": "src/greet.ts",
                "oldString": "=>1",
                "newString": "=>1;export const h=()=>2",
            }),
        )],
        vec![ContentBlock::text("Fixed.")],
    ]
}

async fn memory_contents(store: &Arc<dyn RecordStore>) -> Vec<String> {
    store
        .list_memories(MemoryFilter::All, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.content)
        .collect()
}

#[tokio::test]
async fn happy_merge() {
    let gateway = StubGateway::new(vec![planner_script(), builder_creates_file()]);
    let h = harness(gateway, vec![CheckOutcome::passed()], 3).await;

    let merged = h.controller.iterate().await.unwrap();
    assert!(merged);

    assert_eq!(*h.commits.commits.lock().unwrap(), 1);

    let events = h.events.lock().unwrap().clone();
    let checks_at = events.iter().position(|e| e == "checks:pass").unwrap();
    let merge_at = events.iter().position(|e| e == "merge:1").unwrap();
    assert!(checks_at < merge_at, "merge must follow a passing check");
    assert!(events.contains(&"reset".to_string()));

    let contents = memory_contents(&h.store).await;
    assert!(contents.iter().any(|c| c == "Merged PR #1: Add greet"));
    assert!(contents
        .iter()
        .any(|c| c.starts_with("Planned change \"Add greet\"")));
    assert!(contents.iter().any(|c| c.starts_with("Reflection:")));
}

#[tokio::test]
async fn fix_then_merge() {
    let gateway = StubGateway::new(vec![
        planner_script(),
        builder_creates_file(),
        (Phase::Fixer, fixer_round("tu_fix")),
    ]);
    let h = harness(
        gateway,
        vec![CheckOutcome::failed("Tests failed"), CheckOutcome::passed()],
        3,
    )
    .await;

    let merged = h.controller.iterate().await.unwrap();
    assert!(merged);
    assert_eq!(*h.commits.commits.lock().unwrap(), 2);

    let contents = memory_contents(&h.store).await;
    assert!(contents
        .iter()
        .any(|c| c.starts_with("CI failure on PR #1: Tests failed")));
    assert!(contents.iter().any(|c| c == "Merged PR #1: Add greet"));
}

#[tokio::test]
async fn exhausted_fixer_closes_pr() {
    let mut fixer_turns = fixer_round("tu_fix1");
    fixer_turns.extend(fixer_round("tu_fix2"));
    let gateway = StubGateway::new(vec![
        planner_script(),
        builder_creates_file(),
        (Phase::Fixer, fixer_turns),
    ]);
    let h = harness(
        gateway,
        vec![
            CheckOutcome::failed("Tests failed"),
            CheckOutcome::failed("Tests failed"),
            CheckOutcome::failed("Tests failed"),
        ],
        2,
    )
    .await;

    let merged = h.controller.iterate().await.unwrap();
    assert!(!merged);

    let events = h.events.lock().unwrap().clone();
    assert!(events.contains(&"close:1".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("merge:")));
    // Initial push plus two fix pushes.
    assert_eq!(*h.commits.commits.lock().unwrap(), 3);

    let contents = memory_contents(&h.store).await;
    assert!(contents
        .iter()
        .any(|c| c.starts_with("Closed PR #1 — CI failed:")));
}

#[tokio::test]
async fn empty_edits_skip_to_reflection() {
    let gateway = StubGateway::new(vec![
        planner_script(),
        (Phase::Builder, vec![vec![ContentBlock::text("Nothing to do.")]]),
    ]);
    let h = harness(gateway, vec![], 3).await;

    let merged = h.controller.iterate().await.unwrap();
    assert!(!merged);

    assert_eq!(*h.commits.commits.lock().unwrap(), 0);
    let events = h.events.lock().unwrap().clone();
    assert!(!events.iter().any(|e| e.starts_with("open_pr")));
    assert!(events.contains(&"reset".to_string()));

    let contents = memory_contents(&h.store).await;
    assert!(contents
        .iter()
        .any(|c| c == "Gave up: Builder produced no edits."));
    assert!(contents.iter().any(|c| c.starts_with("Reflection:")));
}
