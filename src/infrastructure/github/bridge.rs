//! CI bridge: PR lifecycle plus the check-run polling state machine.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::client::GitHubClient;
use super::models::CheckRun;
use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::ports::{AgentPr, CheckOutcome, CiBridge};
use crate::infrastructure::shutdown::Shutdown;

/// Cap on log text included per failing job.
const JOB_LOG_LIMIT: usize = 4_000;

/// Timing knobs for the check poller; defaults match production.
#[derive(Debug, Clone)]
pub struct CheckTimings {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Grace period while zero check runs have appeared.
    pub no_checks_timeout: Duration,
    /// Overall wait ceiling.
    pub timeout: Duration,
}

impl Default for CheckTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            no_checks_timeout: Duration::from_secs(120),
            timeout: Duration::from_secs(1_200),
        }
    }
}

/// GitHub-backed implementation of [`CiBridge`].
pub struct GitHubCiBridge {
    client: GitHubClient,
    main_branch: String,
    branch_prefix: String,
    timings: CheckTimings,
    shutdown: Shutdown,
}

impl GitHubCiBridge {
    pub fn new(
        client: GitHubClient,
        main_branch: String,
        branch_prefix: String,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            client,
            main_branch,
            branch_prefix,
            timings: CheckTimings::default(),
            shutdown,
        }
    }

    pub fn with_timings(mut self, timings: CheckTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Build the compact failure report for a set of failing check runs.
    async fn failure_report(&self, sha: &str, failing: &[CheckRun]) -> String {
        let mut report = String::new();
        for run in failing {
            let conclusion = run.conclusion.as_deref().unwrap_or("unknown");
            report.push_str(&format!("Check \"{}\": {}\n", run.name, conclusion));
            if let Some(output) = &run.output {
                if let Some(summary) = output.summary.as_deref().filter(|s| !s.is_empty()) {
                    report.push_str(summary);
                    report.push('\n');
                } else if let Some(text) = output.text.as_deref().filter(|s| !s.is_empty()) {
                    report.push_str(text);
                    report.push('\n');
                }
                if output.annotations_count > 0 {
                    match self.client.list_annotations(run.id).await {
                        Ok(annotations) => {
                            for a in annotations {
                                report.push_str(&format!(
                                    "{}:{} {}\n",
                                    a.path, a.start_line, a.message
                                ));
                            }
                        }
                        Err(e) => debug!("annotation fetch failed: {e}"),
                    }
                }
            }
        }

        // Job logs give the model the actual failure text when check-run
        // output is sparse.
        match self.client.list_workflow_runs(sha).await {
            Ok(runs) => {
                for run in runs
                    .workflow_runs
                    .iter()
                    .filter(|r| r.conclusion.as_deref() == Some("failure"))
                {
                    match self.client.list_jobs(run.id).await {
                        Ok(jobs) => {
                            for job in jobs
                                .jobs
                                .iter()
                                .filter(|j| j.conclusion.as_deref() == Some("failure"))
                            {
                                report.push_str(&format!("Failed job \"{}\":\n", job.name));
                                match self.client.job_logs(job.id).await {
                                    Ok(Some(logs)) => {
                                        report.push_str(&truncate_tail(&logs, JOB_LOG_LIMIT));
                                        report.push('\n');
                                    }
                                    Ok(None) => {
                                        // Log download forbidden; fall back
                                        // to the failing step names.
                                        for step in job
                                            .steps
                                            .iter()
                                            .filter(|s| s.conclusion.as_deref() == Some("failure"))
                                        {
                                            report.push_str(&format!(
                                                "  failed step: {}\n",
                                                step.name
                                            ));
                                        }
                                    }
                                    Err(e) => debug!("job log fetch failed: {e}"),
                                }
                            }
                        }
                        Err(e) => debug!("job list fetch failed: {e}"),
                    }
                }
            }
            Err(e) => debug!("workflow run fetch failed: {e}"),
        }

        report.trim_end().to_string()
    }
}

/// Keep the last `limit` bytes of a log (the failure is at the end).
fn truncate_tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let start = text.len() - limit;
    // Snap to a char boundary.
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(start);
    format!("(log truncated)\n{}", &text[start..])
}

#[async_trait]
impl CiBridge for GitHubCiBridge {
    #[instrument(skip(self, body), err)]
    async fn open_pr(&self, branch: &str, title: &str, body: &str) -> AgentResult<u64> {
        let pr = self
            .client
            .create_pull_request(title, body, branch, &self.main_branch)
            .await?;
        info!(number = pr.number, branch, "opened PR");
        Ok(pr.number)
    }

    #[instrument(skip(self), err)]
    async fn merge_pr(&self, number: u64) -> AgentResult<()> {
        self.client.merge_pull_request(number).await
    }

    #[instrument(skip(self), err)]
    async fn close_pr(&self, number: u64) -> AgentResult<()> {
        self.client.close_pull_request(number).await
    }

    async fn delete_remote_branch(&self, name: &str) -> AgentResult<()> {
        self.client.delete_branch(name).await
    }

    async fn find_open_agent_prs(&self) -> AgentResult<Vec<AgentPr>> {
        let prs = self.client.list_open_pull_requests().await?;
        Ok(prs
            .into_iter()
            .filter(|pr| pr.head.ref_name.starts_with(&self.branch_prefix))
            .map(|pr| AgentPr {
                number: pr.number,
                head_ref: pr.head.ref_name,
            })
            .collect())
    }

    /// Poll check runs until all complete, the repo proves checkless, or a
    /// timeout elapses.
    #[instrument(skip(self), err)]
    async fn await_checks(&self, sha: &str) -> AgentResult<CheckOutcome> {
        let started = Instant::now();
        loop {
            let runs = self.client.list_check_runs(sha).await?;

            if runs.total_count == 0 {
                // NoRuns: within the grace window keep waiting; after it,
                // the repo simply has no checks.
                if started.elapsed() >= self.timings.no_checks_timeout {
                    info!(sha, "no check runs appeared; treating as pass");
                    return Ok(CheckOutcome::passed());
                }
            } else if runs.check_runs.iter().all(CheckRun::is_completed) {
                let failing: Vec<CheckRun> = runs
                    .check_runs
                    .iter()
                    .filter(|run| !run.is_acceptable())
                    .cloned()
                    .collect();
                if failing.is_empty() {
                    return Ok(CheckOutcome::passed());
                }
                let report = self.failure_report(sha, &failing).await;
                warn!(sha, failing = failing.len(), "checks failed");
                return Ok(CheckOutcome::failed(report));
            }

            if started.elapsed() >= self.timings.timeout {
                return Err(AgentError::CiTimedOut);
            }
            self.shutdown.sleep(self.timings.poll_interval).await?;
        }
    }

    /// Best-effort: scrape a coverage figure from main's check-run output.
    async fn latest_main_coverage(&self) -> AgentResult<Option<String>> {
        let runs = match self.client.list_check_runs(&self.main_branch).await {
            Ok(runs) => runs,
            Err(e) => {
                debug!("coverage lookup failed: {e}");
                return Ok(None);
            }
        };
        let coverage = runs
            .check_runs
            .iter()
            .filter(|run| run.name.to_lowercase().contains("coverage"))
            .find_map(|run| {
                run.output
                    .as_ref()
                    .and_then(|o| o.summary.clone())
                    .filter(|s| !s.is_empty())
            });
        Ok(coverage)
    }
}
