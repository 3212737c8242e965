//! Batch-mode HTTP client for the vendor's Messages Batches API.
//!
//! Submission is always a single-element batch: batch processing costs
//! half of interactive submission, and the agent never needs more than one
//! in-flight request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;

use super::error::ApiError;
use super::retry::RetryPolicy;
use super::types::{
    BatchObject, BatchRequestItem, BatchResultLine, BatchSubmission, MessageParams,
};
use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::ports::llm_client::{BatchClient, BatchState, LlmRequest, LlmResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for the vendor client.
pub struct AnthropicClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl AnthropicClientConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            timeout_secs: 120,
        }
    }
}

/// HTTP client implementing [`BatchClient`] over the vendor batch API.
pub struct AnthropicBatchClient {
    http_client: ReqwestClient,
    api_key: String,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl AnthropicBatchClient {
    pub fn new(config: AnthropicClientConfig) -> AgentResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| AgentError::ConfigMissing(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url,
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.initial_backoff_ms,
                config.max_backoff_ms,
            ),
        })
    }

    fn headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    async fn post_batch(&self, submission: &BatchSubmission) -> Result<BatchObject, ApiError> {
        let response = self
            .headers(
                self.http_client
                    .post(format!("{}/v1/messages/batches", self.base_url)),
            )
            .json(submission)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }
        Ok(response.json().await?)
    }

    async fn get_batch(&self, batch_id: &str) -> Result<BatchObject, ApiError> {
        let response = self
            .headers(
                self.http_client
                    .get(format!("{}/v1/messages/batches/{batch_id}", self.base_url)),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }
        Ok(response.json().await?)
    }

    async fn get_results(&self, batch_id: &str) -> Result<String, ApiError> {
        let response = self
            .headers(self.http_client.get(format!(
                "{}/v1/messages/batches/{batch_id}/results",
                self.base_url
            )))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }
        Ok(response.text().await?)
    }

    fn map_error(err: ApiError) -> AgentError {
        match err {
            ApiError::RateLimitExceeded => AgentError::RemoteRateLimited(err.to_string()),
            other => AgentError::LlmBatchFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl BatchClient for AnthropicBatchClient {
    async fn submit(&self, request: &LlmRequest) -> AgentResult<String> {
        let submission = BatchSubmission {
            requests: vec![BatchRequestItem {
                custom_id: "req_0".to_string(),
                params: MessageParams::from_request(request),
            }],
        };

        let batch = self
            .retry_policy
            .execute(|| self.post_batch(&submission))
            .await
            .map_err(Self::map_error)?;
        Ok(batch.id)
    }

    async fn poll(&self, batch_id: &str) -> AgentResult<BatchState> {
        let batch = self
            .retry_policy
            .execute(|| self.get_batch(batch_id))
            .await
            .map_err(Self::map_error)?;

        if batch.processing_status != "ended" {
            return Ok(BatchState::InProgress);
        }

        let raw = self
            .retry_policy
            .execute(|| self.get_results(batch_id))
            .await
            .map_err(Self::map_error)?;

        let line = raw.lines().find(|l| !l.trim().is_empty()).ok_or_else(|| {
            AgentError::LlmBatchFailed(format!("batch {batch_id} ended with empty results"))
        })?;
        let parsed: BatchResultLine = serde_json::from_str(line).map_err(|e| {
            AgentError::LlmBatchFailed(format!("failed to parse batch result: {e}"))
        })?;

        match parsed.result.result_type.as_str() {
            "succeeded" => {
                let message = parsed.result.message.ok_or_else(|| {
                    AgentError::LlmBatchFailed("succeeded result without message".to_string())
                })?;
                Ok(BatchState::Succeeded(LlmResponse {
                    content: message.content,
                    stop_reason: message.stop_reason,
                    usage: message.usage,
                }))
            }
            other => {
                let detail = parsed
                    .result
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                Ok(BatchState::Failed(format!("{other}: {detail}")))
            }
        }
    }
}
