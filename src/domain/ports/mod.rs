//! Ports: async trait boundaries between the core and its collaborators.

pub mod ci;
pub mod gateway;
pub mod llm_client;
pub mod record_store;
pub mod source_control;

pub use ci::{AgentPr, CheckOutcome, CiBridge};
pub use gateway::{IterationContext, LlmGateway};
pub use llm_client::{BatchClient, BatchState, LlmRequest, LlmResponse, SystemBlock, ToolDef};
pub use record_store::{MemoryFilter, RecordStore};
pub use source_control::SourceControl;
