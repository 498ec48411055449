//! Global cooldown guard
//!
//! Coarse, provider-agnostic suppression window armed by any failed call.
//! Distinct from the circuit breaker: it ignores targets and failure counts.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub struct CooldownGuard {
    cooldown: Duration,
    last_failure_at: Mutex<Option<Instant>>,
}

impl CooldownGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_failure_at: Mutex::new(None),
        }
    }

    pub fn from_millis(cooldown_ms: u64) -> Self {
        Self::new(Duration::from_millis(cooldown_ms))
    }

    pub fn is_enabled(&self) -> bool {
        !self.cooldown.is_zero()
    }

    /// Time left before calls are admitted again, if blocked
    pub fn remaining(&self) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let last = *self
            .last_failure_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let elapsed = last?.elapsed();
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    pub fn blocked(&self) -> bool {
        self.remaining().is_some()
    }

    pub fn mark_failure(&self) {
        if !self.is_enabled() {
            return;
        }
        *self
            .last_failure_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
        tracing::debug!(cooldown_ms = self.cooldown.as_millis() as u64, "Cooldown armed");
    }

    pub fn clear(&self) {
        *self
            .last_failure_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
