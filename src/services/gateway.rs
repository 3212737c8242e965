//! The LLM gateway: phase-labeled completions over the vendor batch API.
//!
//! Every call submits a single-element batch (half the price of
//! interactive submission), polls with exponential backoff until the batch
//! ends, strips unverifiable thinking signatures, records the exchange
//! with its computed cost, and returns the assistant message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{AgentError, AgentResult};
use crate::domain::models::{strip_thinking_signatures, Message, NewGeneratedRecord, Phase};
use crate::domain::ports::{
    BatchClient, BatchState, IterationContext, LlmGateway, LlmRequest, LlmResponse, RecordStore,
    ToolDef,
};
use crate::infrastructure::config::{LlmConfig, PhaseModelConfig};
use crate::infrastructure::shutdown::Shutdown;
use crate::services::pricing::compute_cost;
use crate::services::prompts::system_blocks;

/// Thinking budgets leave at least this much of the response ceiling.
const THINKING_HEADROOM: u32 = 2_048;

struct GatewayState {
    iteration_id: Option<Uuid>,
    context: IterationContext,
}

/// Production gateway over a [`BatchClient`] and a [`RecordStore`].
pub struct Gateway {
    client: Arc<dyn BatchClient>,
    store: Arc<dyn RecordStore>,
    config: LlmConfig,
    shutdown: Shutdown,
    state: Mutex<GatewayState>,
}

impl Gateway {
    pub fn new(
        client: Arc<dyn BatchClient>,
        store: Arc<dyn RecordStore>,
        config: LlmConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            client,
            store,
            config,
            shutdown,
            state: Mutex::new(GatewayState {
                iteration_id: None,
                context: IterationContext::default(),
            }),
        }
    }

    fn phase_config(&self, phase: Phase) -> &PhaseModelConfig {
        match phase {
            Phase::Planner => &self.config.planner,
            Phase::Builder => &self.config.builder,
            Phase::Fixer => &self.config.fixer,
            Phase::Reflect => &self.config.reflect,
            Phase::Memory => &self.config.memory,
        }
    }

    fn thinking_budget(&self, phase: Phase, max_tokens: u32) -> Option<u32> {
        if !phase.uses_thinking() {
            return None;
        }
        let ceiling = max_tokens.saturating_sub(THINKING_HEADROOM);
        Some(self.config.thinking_budget.min(ceiling))
    }

    /// Poll the batch until it ends, backing off between polls.
    async fn await_batch(&self, batch_id: &str) -> AgentResult<LlmResponse> {
        let mut interval = Duration::from_secs(self.config.poll_interval_secs);
        let max_interval = Duration::from_secs(self.config.max_poll_interval_secs);
        loop {
            self.shutdown.sleep(interval).await?;
            match self.client.poll(batch_id).await? {
                BatchState::InProgress => {
                    debug!(batch_id, ?interval, "batch still processing");
                    interval = Duration::from_secs_f64(
                        (interval.as_secs_f64() * self.config.poll_backoff)
                            .min(max_interval.as_secs_f64()),
                    );
                }
                BatchState::Succeeded(response) => return Ok(response),
                BatchState::Failed(detail) => {
                    return Err(AgentError::LlmBatchFailed(detail));
                }
            }
        }
    }
}

#[async_trait]
impl LlmGateway for Gateway {
    #[instrument(skip(self, messages, extra_tools), fields(phase = %phase), err)]
    async fn complete(
        &self,
        phase: Phase,
        messages: &[Message],
        extra_tools: &[ToolDef],
    ) -> AgentResult<LlmResponse> {
        let (iteration_id, system) = {
            let state = self.state.lock().await;
            (
                state.iteration_id.unwrap_or(Uuid::nil()),
                system_blocks(phase, &state.context),
            )
        };

        let phase_config = self.phase_config(phase);
        let request = LlmRequest {
            model: phase_config.model.clone(),
            max_tokens: phase_config.max_tokens,
            system: system.clone(),
            messages: messages.to_vec(),
            tools: extra_tools.to_vec(),
            thinking_budget: self.thinking_budget(phase, phase_config.max_tokens),
        };

        let batch_id = self.client.submit(&request).await?;
        debug!(%batch_id, "batch submitted");
        let mut response = self.await_batch(&batch_id).await?;

        // Signatures are vendor-signed and unverifiable after the fact.
        strip_thinking_signatures(&mut response.content);

        let cost = compute_cost(&phase_config.model, &response.usage, true);
        self.store
            .insert_generated(NewGeneratedRecord {
                phase,
                model_id: phase_config.model.clone(),
                iteration_id,
                system_blocks: system.into_iter().map(|b| b.text).collect(),
                messages: messages.to_vec(),
                response: response.content.clone(),
                usage: response.usage.clone(),
                cost,
                batch: true,
                stop_reason: response.stop_reason.clone(),
            })
            .await?;

        info!(
            phase = %phase,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            cost,
            "completion recorded"
        );
        Ok(response)
    }

    async fn begin_iteration(&self, iteration_id: Uuid, context: IterationContext) {
        let mut state = self.state.lock().await;
        state.iteration_id = Some(iteration_id);
        state.context = context;
    }

    async fn end_iteration(&self) {
        let mut state = self.state.lock().await;
        state.iteration_id = None;
        state.context = IterationContext::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ContentBlock, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        polls_until_done: u32,
        polls: AtomicU32,
        outcome: BatchState,
    }

    #[async_trait]
    impl BatchClient for ScriptedClient {
        async fn submit(&self, _request: &LlmRequest) -> AgentResult<String> {
            Ok("batch_1".to_string())
        }

        async fn poll(&self, _batch_id: &str) -> AgentResult<BatchState> {
            if self.polls.fetch_add(1, Ordering::SeqCst) < self.polls_until_done {
                Ok(BatchState::InProgress)
            } else {
                Ok(self.outcome.clone())
            }
        }
    }

    use crate::domain::ports::record_store::MockStore;

    fn fast_config() -> LlmConfig {
        LlmConfig {
            poll_interval_secs: 0,
            max_poll_interval_secs: 0,
            ..Default::default()
        }
    }

    fn success_state() -> BatchState {
        BatchState::Succeeded(LlmResponse {
            content: vec![
                ContentBlock::Thinking {
                    thinking: "hm".into(),
                    signature: Some("sig".into()),
                },
                ContentBlock::text("done"),
            ],
            stop_reason: Some("end_turn".into()),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            },
        })
    }

    #[tokio::test]
    async fn test_complete_polls_until_done_and_records() {
        let client = Arc::new(ScriptedClient {
            polls_until_done: 3,
            polls: AtomicU32::new(0),
            outcome: success_state(),
        });
        let mut store = MockStore::new();
        store
            .expect_insert_generated()
            .withf(|record| {
                // Signature stripping must happen before persistence.
                let json = serde_json::to_string(&record.response).unwrap();
                record.batch && !json.contains("signature")
            })
            .times(1)
            .returning(|_| Ok(1));
        let gateway = Gateway::new(
            client.clone(),
            Arc::new(store),
            fast_config(),
            Shutdown::new(),
        );

        let response = gateway
            .complete(Phase::Builder, &[Message::user("go")], &[])
            .await
            .unwrap();

        assert_eq!(client.polls.load(Ordering::SeqCst), 4);
        // The returned message is stripped too.
        match &response.content[0] {
            ContentBlock::Thinking { signature, .. } => assert!(signature.is_none()),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_batch_surfaces_detail() {
        let client = Arc::new(ScriptedClient {
            polls_until_done: 0,
            polls: AtomicU32::new(0),
            outcome: BatchState::Failed("errored: too long".into()),
        });
        let mut store = MockStore::new();
        store.expect_insert_generated().times(0);
        let gateway = Gateway::new(client, Arc::new(store), fast_config(), Shutdown::new());

        let err = gateway
            .complete(Phase::Planner, &[Message::user("go")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::LlmBatchFailed(_)));
    }

    #[tokio::test]
    async fn test_memory_phase_disables_thinking() {
        let gateway = Gateway::new(
            Arc::new(ScriptedClient {
                polls_until_done: 0,
                polls: AtomicU32::new(0),
                outcome: success_state(),
            }),
            Arc::new(MockStore::new()),
            fast_config(),
            Shutdown::new(),
        );
        assert!(gateway.thinking_budget(Phase::Memory, 4096).is_none());
        // Budget clamps to max_tokens - headroom.
        assert_eq!(gateway.thinking_budget(Phase::Builder, 4096), Some(2048));
    }
}
