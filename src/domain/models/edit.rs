//! Edit operations produced by the builder dialog.
//!
//! A patch is an ordered list of operations against the working copy.
//! Replace carries single-match semantics: the old string must occur
//! exactly once in the target file at apply time.

use serde::{Deserialize, Serialize};

/// A single structured edit against the working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    /// Replace one occurrence of `old_string` with `new_string`.
    Replace {
        path: String,
        old_string: String,
        new_string: String,
    },
    /// Create a file (parent directories are created as needed).
    Create { path: String, content: String },
    /// Remove a file.
    Delete { path: String },
}

impl EditOperation {
    /// The path this operation targets.
    pub fn path(&self) -> &str {
        match self {
            Self::Replace { path, .. } | Self::Create { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Short verb for log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
        }
    }

    /// Validate structural invariants (non-empty path, Replace strings present).
    pub fn validate(&self) -> Result<(), String> {
        if self.path().is_empty() {
            return Err("edit operation path cannot be empty".to_string());
        }
        if let Self::Replace { old_string, .. } = self {
            if old_string.is_empty() {
                return Err("replace requires a non-empty old string".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_path() {
        let op = EditOperation::Delete {
            path: String::new(),
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_old_string() {
        let op = EditOperation::Replace {
            path: "src/lib.rs".into(),
            old_string: String::new(),
            new_string: "x".into(),
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_path_accessor() {
        let op = EditOperation::Create {
            path: "src/new.rs".into(),
            content: "pub fn f() {}".into(),
        };
        assert_eq!(op.path(), "src/new.rs");
        assert_eq!(op.verb(), "create");
    }

    #[test]
    fn test_serde_round_trip() {
        let op = EditOperation::Replace {
            path: "a.rs".into(),
            old_string: "old".into(),
            new_string: "new".into(),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""op":"replace""#));
        let back: EditOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
