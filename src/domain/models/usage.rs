//! Per-request token accounting.

use serde::{Deserialize, Serialize};

/// Breakdown of cache-creation tokens by TTL bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCreation {
    #[serde(default)]
    pub ephemeral_5m_input_tokens: u64,
    #[serde(default)]
    pub ephemeral_1h_input_tokens: u64,
}

/// Token usage reported by the vendor for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Optional split of `cache_creation_input_tokens` into 5m/1h buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation: Option<CacheCreation>,
}

impl TokenUsage {
    /// Cache-write tokens billed at the 5-minute rate.
    ///
    /// When the vendor omits the TTL split, the whole cache-creation count
    /// is treated as 5-minute writes.
    pub fn cache_write_5m(&self) -> u64 {
        match self.cache_creation {
            Some(split) => split.ephemeral_5m_input_tokens,
            None => self.cache_creation_input_tokens,
        }
    }

    /// Cache-write tokens billed at the 1-hour rate.
    pub fn cache_write_1h(&self) -> u64 {
        self.cache_creation
            .map(|split| split.ephemeral_1h_input_tokens)
            .unwrap_or(0)
    }

    /// Merge another usage into this one (for per-phase rollups).
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        let mine = self
            .cache_creation
            .get_or_insert_with(CacheCreation::default);
        mine.ephemeral_5m_input_tokens += other.cache_write_5m();
        mine.ephemeral_1h_input_tokens += other.cache_write_1h();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsplit_cache_creation_counts_as_5m() {
        let usage = TokenUsage {
            cache_creation_input_tokens: 500,
            ..Default::default()
        };
        assert_eq!(usage.cache_write_5m(), 500);
        assert_eq!(usage.cache_write_1h(), 0);
    }

    #[test]
    fn test_split_cache_creation() {
        let usage = TokenUsage {
            cache_creation_input_tokens: 700,
            cache_creation: Some(CacheCreation {
                ephemeral_5m_input_tokens: 200,
                ephemeral_1h_input_tokens: 500,
            }),
            ..Default::default()
        };
        assert_eq!(usage.cache_write_5m(), 200);
        assert_eq!(usage.cache_write_1h(), 500);
    }

    #[test]
    fn test_accumulate() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
            cache_creation_input_tokens: 30,
            ..Default::default()
        });
        total.accumulate(&TokenUsage {
            input_tokens: 1,
            cache_read_input_tokens: 5,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 20);
        assert_eq!(total.cache_read_input_tokens, 5);
        assert_eq!(total.cache_write_5m(), 30);
    }
}
