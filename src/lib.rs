//! autograft - an autonomous software-change agent.
//!
//! Each iteration plans one concrete change, builds a patch through a
//! tool-calling model dialog, opens a PR, shepherds it through CI, and
//! records a reflection so the next iteration can learn from this one.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{AgentError, AgentResult};
pub use infrastructure::config::{Config, ConfigError};
