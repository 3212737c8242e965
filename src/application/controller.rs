//! The iteration controller: the top-level state machine.
//!
//! One iteration runs snapshot → plan → build → push → checks → fix loop →
//! merge-or-abandon → reflect → persist. The workspace is reset on every
//! exit path; reflection and outcome memories are best-effort so a storage
//! outage cannot mask the original failure.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{IterationLog, Message, Plan};
use crate::domain::ports::{
    CiBridge, IterationContext, LlmGateway, RecordStore, SourceControl,
};
use crate::services::memory_service::MemoryService;
use crate::services::patch_session::PatchSession;
use crate::services::planner::Planner;
use crate::services::tools::ToolRegistry;

use super::snapshot::snapshot_codebase;

/// Commits shown to the planner.
const GIT_LOG_DEPTH: u32 = 20;

/// Outcome strings keep CI errors to this many characters.
const OUTCOME_ERROR_LIMIT: usize = 500;

/// Everything the controller needs, injected at startup.
pub struct ControllerDeps {
    pub gateway: Arc<dyn LlmGateway>,
    pub memory: Arc<MemoryService>,
    pub workspace: Arc<dyn SourceControl>,
    pub ci: Arc<dyn CiBridge>,
    pub store: Arc<dyn RecordStore>,
    pub tools: Arc<ToolRegistry>,
}

pub struct IterationController {
    deps: ControllerDeps,
    max_fix_attempts: u32,
}

/// Mutable state threaded through one iteration.
struct Scratch {
    plan: Option<Plan>,
    planner_messages: Vec<Message>,
    session: Option<PatchSession>,
    branch: Option<String>,
    pr: Option<u64>,
    merged: bool,
    outcome: Option<String>,
}

impl Scratch {
    fn new() -> Self {
        Self {
            plan: None,
            planner_messages: Vec::new(),
            session: None,
            branch: None,
            pr: None,
            merged: false,
            outcome: None,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

impl IterationController {
    pub fn new(deps: ControllerDeps, max_fix_attempts: u32) -> Self {
        Self {
            deps,
            max_fix_attempts,
        }
    }

    /// Run iterations until one merges.
    pub async fn run(&self) -> AgentResult<()> {
        self.cleanup_stray_prs().await;
        loop {
            if self.iterate().await? {
                return Ok(());
            }
            info!("iteration did not merge; starting a fresh plan");
        }
    }

    /// Close any open agent PRs left behind by earlier runs. Best-effort.
    pub async fn cleanup_stray_prs(&self) {
        let prs = match self.deps.ci.find_open_agent_prs().await {
            Ok(prs) => prs,
            Err(e) => {
                warn!("stray PR enumeration failed: {e}");
                return;
            }
        };
        for pr in prs {
            info!(number = pr.number, head = %pr.head_ref, "closing stray agent PR");
            if let Err(e) = self.deps.ci.close_pr(pr.number).await {
                warn!("failed to close stray PR #{}: {e}", pr.number);
            }
            if let Err(e) = self.deps.ci.delete_remote_branch(&pr.head_ref).await {
                warn!("failed to delete stray branch {}: {e}", pr.head_ref);
            }
        }
    }

    /// One complete iteration. Returns true on merge.
    #[instrument(skip(self), err)]
    pub async fn iterate(&self) -> AgentResult<bool> {
        let iteration_id = Uuid::new_v4();
        let mut log = IterationLog::default();
        let mut scratch = Scratch::new();

        let pipeline_err = self
            .pipeline(iteration_id, &mut scratch, &mut log)
            .await
            .err();

        // Finally: the workspace is reset on every exit path.
        if let Err(e) = self.deps.workspace.reset_workspace().await {
            warn!("workspace reset failed: {e}");
            log.warn(format!("workspace reset failed: {e}"));
        }

        let outcome = match pipeline_err {
            Some(AgentError::Cancelled) => {
                self.deps.gateway.end_iteration().await;
                return Err(AgentError::Cancelled);
            }
            Some(e) if !e.aborts_iteration_only() => {
                // Fatal: storage down, config broken. Surface immediately.
                self.deps.gateway.end_iteration().await;
                error!("iteration failed fatally: {e}");
                return Err(e);
            }
            Some(e) => scratch
                .outcome
                .take()
                .unwrap_or_else(|| format!("Iteration aborted: {e}")),
            None => scratch
                .outcome
                .take()
                .unwrap_or_else(|| "Iteration ended without an outcome.".to_string()),
        };
        log.info(format!("outcome: {outcome}"));
        info!(%outcome, "iteration finished");

        self.conclude(&scratch, &outcome).await;
        self.reflect_and_persist(iteration_id, &scratch, &outcome, &mut log)
            .await;
        self.deps.gateway.end_iteration().await;

        Ok(scratch.merged)
    }

    /// Steps 1-10 of the iteration sequence. Sets outcome/merged on
    /// `scratch`; returns Err only for aborts.
    async fn pipeline(
        &self,
        iteration_id: Uuid,
        scratch: &mut Scratch,
        log: &mut IterationLog,
    ) -> AgentResult<()> {
        // 1-2: snapshot and context gathering.
        let snapshot = snapshot_codebase(self.deps.workspace.root());
        let memory_context = self.deps.memory.get_context().await?;
        let git_log = self.deps.workspace.recent_log(GIT_LOG_DEPTH).await?;
        let coverage = self
            .deps
            .ci
            .latest_main_coverage()
            .await
            .unwrap_or_default();

        self.deps
            .gateway
            .begin_iteration(
                iteration_id,
                IterationContext {
                    codebase_snapshot: Some(snapshot),
                    coverage_summary: coverage,
                    git_log: Some(git_log),
                    memory_context: Some(memory_context.clone()),
                    dead_functions: None,
                },
            )
            .await;

        // 3: plan.
        let planner = Planner::new(self.deps.gateway.clone(), self.deps.tools.clone());
        let (plan, planner_messages) = planner.plan().await?;
        log.info(format!("planned: {}", plan.title));
        scratch.planner_messages = planner_messages;

        // 4: the plan itself becomes a past memory. Storage failures here
        // abort the iteration (only the crash-reporting path swallows).
        self.deps
            .memory
            .store_past(&format!(
                "Planned change \"{}\": {}",
                plan.title, plan.description
            ))
            .await?;

        // 5-6: session and branch. The session lives in scratch so its
        // transcript survives aborts for reflection.
        scratch.session = Some(PatchSession::new(
            self.deps.gateway.clone(),
            self.deps.tools.clone(),
            plan.clone(),
            memory_context,
            self.max_fix_attempts,
        ));
        let branch = self.deps.workspace.create_branch(&plan.title).await?;
        log.info(format!("branch: {branch}"));
        scratch.branch = Some(branch.clone());
        scratch.plan = Some(plan.clone());

        // 7: build the patch.
        let edits = scratch
            .session
            .as_mut()
            .expect("session set above")
            .create_patch()
            .await?;
        if edits.is_empty() {
            scratch.outcome = Some("Builder produced no edits.".to_string());
            return Ok(());
        }
        log.info(format!("builder produced {} edits", edits.len()));

        // 8: push and open the PR.
        self.deps
            .workspace
            .commit_and_push(&plan.title, false)
            .await?;
        let pr = self
            .deps
            .ci
            .open_pr(&branch, &plan.title, &plan.description)
            .await?;
        scratch.pr = Some(pr);
        log.info(format!("opened PR #{pr}"));

        // 9: the fix loop.
        loop {
            let sha = self.deps.workspace.head_sha().await?;
            let checks = match self.deps.ci.await_checks(&sha).await {
                Ok(checks) => checks,
                Err(AgentError::CiTimedOut) => {
                    scratch.outcome = Some("CI failed: Timed out".to_string());
                    break;
                }
                Err(e) => return Err(e),
            };

            if checks.passed {
                scratch.merged = true;
                scratch.outcome = Some(format!("PR #{pr} merged successfully."));
                break;
            }

            let ci_error = checks.error.unwrap_or_else(|| "Checks failed".to_string());
            log.warn(format!("CI failed on PR #{pr}"));
            if scratch.session.as_ref().is_some_and(PatchSession::exhausted) {
                scratch.outcome = Some(format!(
                    "CI failed: {}",
                    truncate_chars(&ci_error, OUTCOME_ERROR_LIMIT)
                ));
                break;
            }

            self.deps
                .memory
                .store_past(&format!(
                    "CI failure on PR #{pr}: {}",
                    truncate_chars(&ci_error, OUTCOME_ERROR_LIMIT)
                ))
                .await?;

            let diff = self.deps.workspace.diff().await.unwrap_or_default();
            let fix_result = scratch
                .session
                .as_mut()
                .expect("session set above")
                .fix_patch(&ci_error, &diff)
                .await;
            let fix_edits = match fix_result {
                Ok(edits) => edits,
                Err(e) => {
                    scratch.outcome = Some(format!("Builder failed to fix: {e}"));
                    break;
                }
            };
            if fix_edits.is_empty() {
                scratch.outcome = Some("Builder produced no fix edits.".to_string());
                break;
            }
            log.info(format!(
                "fix attempt {} pushed {} edits",
                scratch.session.as_ref().map(PatchSession::attempts).unwrap_or(0),
                fix_edits.len()
            ));
            self.deps
                .workspace
                .commit_and_push(&plan.title, false)
                .await?;
        }

        // 10: merge while the checks verdict is fresh.
        if scratch.merged {
            self.deps.ci.merge_pr(pr).await?;
            log.info(format!("merged PR #{pr}"));
        }

        Ok(())
    }

    /// Steps 10b-11: post-merge / abandon bookkeeping. Best-effort.
    async fn conclude(&self, scratch: &Scratch, outcome: &str) {
        let title = scratch
            .plan
            .as_ref()
            .map(|plan| plan.title.as_str())
            .unwrap_or("(no plan)");

        if let (true, Some(pr)) = (scratch.merged, scratch.pr) {
            if let Some(branch) = &scratch.branch {
                if let Err(e) = self.deps.ci.delete_remote_branch(branch).await {
                    warn!("branch delete failed: {e}");
                }
            }
            self.store_memory(&format!("Merged PR #{pr}: {title}")).await;
            if let Ok(Some(coverage)) = self.deps.ci.latest_main_coverage().await {
                self.store_memory(&format!("Coverage after merging PR #{pr}: {coverage}"))
                    .await;
            }
        } else if let Some(pr) = scratch.pr {
            if let Err(e) = self.deps.ci.close_pr(pr).await {
                warn!("close PR #{pr} failed: {e}");
            }
            if let Some(branch) = &scratch.branch {
                if let Err(e) = self.deps.ci.delete_remote_branch(branch).await {
                    warn!("branch delete failed: {e}");
                }
            }
            self.store_memory(&format!("Closed PR #{pr} — {outcome}")).await;
        } else {
            self.store_memory(&format!("Gave up: {outcome}")).await;
        }
    }

    /// Steps 13-14: reflection and the iteration log. Best-effort; a
    /// storage outage here must not mask the iteration outcome.
    async fn reflect_and_persist(
        &self,
        iteration_id: Uuid,
        scratch: &Scratch,
        outcome: &str,
        log: &mut IterationLog,
    ) {
        let planner = Planner::new(self.deps.gateway.clone(), self.deps.tools.clone());
        let mut transcript = scratch.planner_messages.clone();
        if let Some(session) = &scratch.session {
            transcript.extend_from_slice(session.conversation());
        }

        match planner.reflect(outcome, &transcript).await {
            Ok(reflection) if !reflection.is_empty() => {
                self.store_memory(&format!("Reflection: {reflection}")).await;
                log.info("reflection stored");
            }
            Ok(_) => warn!("reflection was empty"),
            Err(e) => warn!("reflection failed: {e}"),
        }

        match self.deps.store.phase_usage(iteration_id).await {
            Ok(usage) if !usage.is_empty() => log.token_usage = Some(usage),
            Ok(_) => {}
            Err(e) => warn!("phase usage rollup failed: {e}"),
        }
        if let Err(e) = self.deps.store.insert_iteration_log(log).await {
            warn!("iteration log persist failed: {e}");
        }
    }

    /// Store a past memory, swallowing failures (crash-reporting path).
    async fn store_memory(&self, content: &str) {
        if let Err(e) = self.deps.memory.store_past(content).await {
            warn!("memory store failed: {e}");
        }
    }
}
