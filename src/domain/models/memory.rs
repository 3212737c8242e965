//! Memory items: past outcomes, pinned notes, and improvement ideas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workflow status for idea items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    Pending,
    Attempted,
    Completed,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attempted => "attempted",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "attempted" => Some(Self::Attempted),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Label used in the `## Ideas` context section.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pending => "[PENDING]",
            Self::Attempted => "[ATTEMPTED]",
            Self::Completed => "[COMPLETED]",
        }
    }
}

/// A stored memory.
///
/// Items carrying an idea status start out pinned; completing the idea
/// clears the pin. Only `pinned` and `idea_status` mutate after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: i64,
    pub content: String,
    pub summary: String,
    pub pinned: bool,
    pub idea_status: Option<IdeaStatus>,
    pub idea_context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    pub fn is_idea(&self) -> bool {
        self.idea_status.is_some()
    }

    /// Active ideas surface in the `## Ideas` context section.
    pub fn is_active_idea(&self) -> bool {
        matches!(
            self.idea_status,
            Some(IdeaStatus::Pending) | Some(IdeaStatus::Attempted)
        )
    }
}

/// Insert form of [`MemoryItem`].
#[derive(Debug, Clone)]
pub struct NewMemoryItem {
    pub content: String,
    pub summary: String,
    pub pinned: bool,
    pub idea_status: Option<IdeaStatus>,
    pub idea_context: Option<String>,
}

impl NewMemoryItem {
    /// An unpinned past-outcome memory.
    pub fn past(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            summary: summary.into(),
            pinned: false,
            idea_status: None,
            idea_context: None,
        }
    }

    /// A pinned note.
    pub fn pinned(content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            pinned: true,
            ..Self::past(content, summary)
        }
    }

    /// A pinned idea in `pending` state.
    pub fn idea(
        content: impl Into<String>,
        summary: impl Into<String>,
        context: Option<String>,
    ) -> Self {
        Self {
            pinned: true,
            idea_status: Some(IdeaStatus::Pending),
            idea_context: context,
            ..Self::past(content, summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idea_starts_pinned_and_pending() {
        let item = NewMemoryItem::idea("try caching", "cache idea", None);
        assert!(item.pinned);
        assert_eq!(item.idea_status, Some(IdeaStatus::Pending));
    }

    #[test]
    fn test_active_idea_classification() {
        let mut item = MemoryItem {
            id: 1,
            content: "c".into(),
            summary: "s".into(),
            pinned: true,
            idea_status: Some(IdeaStatus::Pending),
            idea_context: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(item.is_active_idea());
        item.idea_status = Some(IdeaStatus::Completed);
        assert!(!item.is_active_idea());
        assert!(item.is_idea());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            IdeaStatus::Pending,
            IdeaStatus::Attempted,
            IdeaStatus::Completed,
        ] {
            assert_eq!(IdeaStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(IdeaStatus::from_str("done"), None);
    }
}
