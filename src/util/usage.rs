//! Cumulative usage tracking for a model connection.

use std::sync::{Arc, RwLock};

use crate::types::usage::Usage;

/// Tracks cumulative usage across the turns of one connection.
///
/// Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct UsageTracker {
    inner: Arc<RwLock<UsageTrackerInner>>,
}

#[derive(Debug, Default)]
struct UsageTrackerInner {
    total_usage: Usage,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage from one completion request.
    pub fn record(&self, usage: &Usage) {
        match self.inner.write() {
            Ok(mut inner) => inner.total_usage.merge(usage),
            Err(_) => tracing::warn!("usage tracker lock poisoned; dropping usage record"),
        }
    }

    /// Point-in-time cumulative usage, or `None` if the counters are unreadable.
    pub fn snapshot(&self) -> Option<Usage> {
        self.inner.read().ok().map(|inner| inner.total_usage.clone())
    }
}
