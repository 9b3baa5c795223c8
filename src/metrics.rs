//! Per-turn metrics.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::types::usage::{TokenDelta, Usage};

/// Counters for one turn, captured when the stream completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub elapsed: Duration,
    /// `None` when the connection had no usage source.
    pub tokens: Option<TokenDelta>,
    pub tool_calls: u32,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}s | ", self.elapsed.as_secs_f64())?;
        match self.tokens {
            Some(tokens) => write!(
                f,
                "tokens in {}, out {}, cached {}",
                tokens.input, tokens.output, tokens.cached
            )?,
            None => f.write_str("tokens unavailable")?,
        }
        write!(f, " | tool calls {}", self.tool_calls)
    }
}

/// Accumulates metrics from turn start to stream completion.
#[derive(Debug)]
pub struct MetricsAccumulator {
    started: Instant,
    before: Option<Usage>,
    tool_calls: u32,
}

impl MetricsAccumulator {
    /// Start timing a turn with the usage snapshot taken before it.
    pub fn start(before: Option<Usage>) -> Self {
        Self {
            started: Instant::now(),
            before,
            tool_calls: 0,
        }
    }

    /// Count one observed tool result.
    pub fn record_tool_result(&mut self) {
        self.tool_calls += 1;
    }

    pub fn tool_calls(&self) -> u32 {
        self.tool_calls
    }

    /// Close the turn with the usage snapshot taken after it.
    pub fn finish(self, after: Option<Usage>) -> MetricsSnapshot {
        let tokens = match (self.before, after) {
            (Some(before), Some(after)) => Some(after.delta_since(&before)),
            _ => None,
        };
        MetricsSnapshot {
            elapsed: self.started.elapsed(),
            tokens,
            tool_calls: self.tool_calls,
        }
    }
}
