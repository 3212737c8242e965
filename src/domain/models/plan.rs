//! The planner's output: one concrete change to attempt.

use serde::{Deserialize, Serialize};

/// Immutable after planning. The title seeds the branch name, the
/// description becomes the PR body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub description: String,
}

impl Plan {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("plan title cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_title_rejected() {
        assert!(Plan::new("  ", "body").validate().is_err());
        assert!(Plan::new("Add greet", "body").validate().is_ok());
    }
}
