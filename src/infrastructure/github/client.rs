//! GitHub HTTP client with rate limiting.
//!
//! Wraps the GitHub REST API v3, providing typed methods for the
//! operations the CI bridge needs. A token-bucket rate limiter keeps the
//! agent within the 5 000 req/hour authenticated API limit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::models::{
    Annotation, CheckRunList, CreatePullRequest, JobList, MergeRequest, PullRequest,
    UpdatePullRequest, WorkflowRunList,
};
use crate::domain::errors::{AgentError, AgentResult};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Token-bucket rate limiter: up to `capacity` requests per `window`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    tokens: u32,
    window: Duration,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity,
            window,
            window_start: Instant::now(),
        }
    }

    /// Acquire a single token, sleeping until the window resets if the
    /// bucket is empty.
    pub async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.tokens = self.capacity;
            self.window_start = Instant::now();
        }

        if self.tokens > 0 {
            self.tokens -= 1;
        } else {
            let remaining = self.window.saturating_sub(elapsed);
            tracing::warn!(
                sleep_ms = remaining.as_millis() as u64,
                "GitHub rate limit reached, sleeping"
            );
            tokio::time::sleep(remaining).await;
            self.tokens = self.capacity - 1;
            self.window_start = Instant::now();
        }
    }
}

/// HTTP client for the GitHub REST API v3.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    token: String,
    base_url: String,
    owner: String,
    repo: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GitHubClient {
    pub fn new(token: String, owner: String, repo: String) -> Self {
        Self::with_base_url(token, owner, repo, GITHUB_API_BASE.to_string())
    }

    pub fn with_base_url(token: String, owner: String, repo: String, base_url: String) -> Self {
        let rate_limiter = RateLimiter::new(5_000, Duration::from_secs(3_600));
        Self {
            http: Client::new(),
            token,
            base_url,
            owner,
            repo,
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url, self.owner, self.repo, path
        )
    }

    async fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.rate_limiter.lock().await.acquire().await;
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "autograft-agent")
    }

    fn map_status(context: &str, status: StatusCode, body: String) -> AgentError {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            AgentError::RemoteRateLimited(format!("GitHub {context} returned {status}: {body}"))
        } else {
            AgentError::GitOperation(format!("GitHub {context} returned {status}: {body}"))
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        builder: reqwest::RequestBuilder,
    ) -> AgentResult<T> {
        let response = builder.send().await.map_err(|e| {
            AgentError::GitOperation(format!("GitHub {context} request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(context, status, body));
        }
        response.json::<T>().await.map_err(|e| {
            AgentError::GitOperation(format!("GitHub {context} parse failed: {e}"))
        })
    }

    async fn send_unit(
        &self,
        context: &str,
        builder: reqwest::RequestBuilder,
    ) -> AgentResult<()> {
        let response = builder.send().await.map_err(|e| {
            AgentError::GitOperation(format!("GitHub {context} request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(context, status, body));
        }
        Ok(())
    }

    pub async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> AgentResult<PullRequest> {
        let url = self.repo_url("/pulls");
        let request = CreatePullRequest {
            title: title.to_string(),
            body: body.to_string(),
            head: head.to_string(),
            base: base.to_string(),
        };
        let builder = self.request(Method::POST, &url).await.json(&request);
        self.send_json("create_pull_request", builder).await
    }

    pub async fn merge_pull_request(&self, number: u64) -> AgentResult<()> {
        let url = self.repo_url(&format!("/pulls/{number}/merge"));
        let request = MergeRequest {
            merge_method: "squash".to_string(),
        };
        let builder = self.request(Method::PUT, &url).await.json(&request);
        self.send_unit("merge_pull_request", builder).await
    }

    pub async fn close_pull_request(&self, number: u64) -> AgentResult<()> {
        let url = self.repo_url(&format!("/pulls/{number}"));
        let request = UpdatePullRequest {
            state: "closed".to_string(),
        };
        let builder = self.request(Method::PATCH, &url).await.json(&request);
        self.send_unit("close_pull_request", builder).await
    }

    pub async fn delete_branch(&self, branch: &str) -> AgentResult<()> {
        let url = self.repo_url(&format!("/git/refs/heads/{branch}"));
        let builder = self.request(Method::DELETE, &url).await;
        self.send_unit("delete_branch", builder).await
    }

    pub async fn list_open_pull_requests(&self) -> AgentResult<Vec<PullRequest>> {
        let url = self.repo_url("/pulls?state=open&per_page=100");
        let builder = self.request(Method::GET, &url).await;
        self.send_json("list_open_pull_requests", builder).await
    }

    pub async fn list_check_runs(&self, git_ref: &str) -> AgentResult<CheckRunList> {
        let url = self.repo_url(&format!("/commits/{git_ref}/check-runs?per_page=100"));
        let builder = self.request(Method::GET, &url).await;
        self.send_json("list_check_runs", builder).await
    }

    pub async fn list_annotations(&self, check_run_id: u64) -> AgentResult<Vec<Annotation>> {
        let url = self.repo_url(&format!("/check-runs/{check_run_id}/annotations"));
        let builder = self.request(Method::GET, &url).await;
        self.send_json("list_annotations", builder).await
    }

    pub async fn list_workflow_runs(&self, head_sha: &str) -> AgentResult<WorkflowRunList> {
        let url = self.repo_url(&format!("/actions/runs?head_sha={head_sha}&per_page=50"));
        let builder = self.request(Method::GET, &url).await;
        self.send_json("list_workflow_runs", builder).await
    }

    pub async fn list_jobs(&self, run_id: u64) -> AgentResult<JobList> {
        let url = self.repo_url(&format!("/actions/runs/{run_id}/jobs?per_page=100"));
        let builder = self.request(Method::GET, &url).await;
        self.send_json("list_jobs", builder).await
    }

    /// Download a job's logs. Returns `None` when the forge forbids log
    /// access (the caller falls back to step names).
    pub async fn job_logs(&self, job_id: u64) -> AgentResult<Option<String>> {
        let url = self.repo_url(&format!("/actions/jobs/{job_id}/logs"));
        let response = self
            .request(Method::GET, &url)
            .await
            .send()
            .await
            .map_err(|e| AgentError::GitOperation(format!("GitHub job_logs request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status("job_logs", status, body));
        }
        Ok(Some(response.text().await.unwrap_or_default()))
    }
}
