//! Token usage types.

use serde::{Deserialize, Serialize};

/// Cumulative token usage reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.cache_read_tokens {
            *self.cache_read_tokens.get_or_insert(0) += v;
        }
    }

    /// Per-field difference `self - earlier`, clamped at zero.
    ///
    /// Counters may reset or move backward between snapshots (for example a
    /// connection was rebuilt); such fields report 0.
    pub fn delta_since(&self, earlier: &Usage) -> TokenDelta {
        TokenDelta {
            input: self.input_tokens.saturating_sub(earlier.input_tokens),
            output: self.output_tokens.saturating_sub(earlier.output_tokens),
            cached: self
                .cache_read_tokens
                .unwrap_or(0)
                .saturating_sub(earlier.cache_read_tokens.unwrap_or(0)),
        }
    }
}

/// Tokens consumed during one turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenDelta {
    pub input: u32,
    pub output: u32,
    pub cached: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_subtracts_each_field() {
        let before = Usage {
            input_tokens: 100,
            output_tokens: 40,
            total_tokens: 140,
            cache_read_tokens: Some(10),
        };
        let after = Usage {
            input_tokens: 250,
            output_tokens: 90,
            total_tokens: 340,
            cache_read_tokens: Some(60),
        };
        assert_eq!(
            after.delta_since(&before),
            TokenDelta {
                input: 150,
                output: 50,
                cached: 50
            }
        );
    }

    #[test]
    fn delta_clamps_counter_reset_to_zero() {
        let before = Usage {
            input_tokens: 500,
            output_tokens: 20,
            total_tokens: 520,
            cache_read_tokens: Some(30),
        };
        let after = Usage {
            input_tokens: 120,
            output_tokens: 35,
            total_tokens: 155,
            cache_read_tokens: None,
        };
        let delta = after.delta_since(&before);
        assert_eq!(delta.input, 0);
        assert_eq!(delta.output, 15);
        assert_eq!(delta.cached, 0);
    }

    #[test]
    fn merge_accumulates_optional_cache_counts() {
        let mut total = Usage::default();
        total.merge(&Usage {
            input_tokens: 3,
            output_tokens: 4,
            total_tokens: 7,
            cache_read_tokens: None,
        });
        total.merge(&Usage {
            input_tokens: 1,
            output_tokens: 1,
            total_tokens: 2,
            cache_read_tokens: Some(5),
        });
        assert_eq!(total.input_tokens, 4);
        assert_eq!(total.total_tokens, 9);
        assert_eq!(total.cache_read_tokens, Some(5));
    }
}
