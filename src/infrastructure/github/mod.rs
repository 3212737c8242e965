//! Forge integration: typed REST client and the CI bridge.

pub mod bridge;
pub mod client;
pub mod models;

pub use bridge::{CheckTimings, GitHubCiBridge};
pub use client::GitHubClient;
