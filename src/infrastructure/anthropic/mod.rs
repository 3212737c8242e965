//! Vendor API integration: wire types, error classification, retries,
//! and the batch submit/poll client.

pub mod batch;
pub mod error;
pub mod retry;
pub mod types;

pub use batch::{AnthropicBatchClient, AnthropicClientConfig};
pub use error::ApiError;
pub use retry::RetryPolicy;
