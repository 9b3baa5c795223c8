//! Tool readiness latch.
//!
//! Tool registration runs in the background. Before a turn is sent, the
//! session polls the gate a bounded number of times and then proceeds either
//! way: a turn sent before registration finishes sees tool calls fail at the
//! model layer instead of blocking the user.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One-way NotReady -> Ready latch, reset explicitly on model switch.
///
/// Clones share state. Each reset starts a new epoch so a registration begun
/// for a replaced connection cannot mark the new one ready.
#[derive(Debug, Clone, Default)]
pub struct ToolReadinessGate {
    inner: Arc<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    ready: AtomicBool,
    epoch: AtomicU64,
}

impl ToolReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Latch the gate. `set(false)` never moves it back; use [`reset`](Self::reset).
    pub fn set(&self, ready: bool) {
        if ready {
            self.inner.ready.store(true, Ordering::Release);
        }
    }

    /// Return to NotReady and start a new epoch.
    pub fn reset(&self) -> u64 {
        self.inner.ready.store(false, Ordering::Release);
        self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// Latch only if no reset happened since `epoch` was read.
    pub fn set_for_epoch(&self, epoch: u64) -> bool {
        if self.epoch() != epoch {
            debug!(epoch, current = self.epoch(), "ignoring stale readiness signal");
            return false;
        }
        self.set(true);
        true
    }
}

/// Bounded fixed-interval polling for [`wait_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    #[serde(with = "millis")]
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(200),
        }
    }
}

/// How the readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Registration did not finish in time; the turn goes ahead without
    /// usable tools.
    ProceedWithoutTools,
}

/// Poll `gate` per `policy`, then decide.
pub async fn wait_until_ready(gate: &ToolReadinessGate, policy: ReadinessPolicy) -> Readiness {
    for attempt in 0..policy.attempts {
        if gate.get() {
            debug!(attempt, "tools ready");
            return Readiness::Ready;
        }
        tokio::time::sleep(policy.interval).await;
    }

    if gate.get() {
        return Readiness::Ready;
    }

    warn!(
        attempts = policy.attempts,
        interval_ms = policy.interval.as_millis() as u64,
        "tool registration not finished; proceeding without tools"
    );
    Readiness::ProceedWithoutTools
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
