//! Retry delay scheduling
//!
//! `delay(i) = base * factor^i * (1 + u * jitter)` with `u` uniform in
//! `[-1, 1]`, floored at `min_delay`. There is no upper cap; the retry budget
//! bounds the total wait.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RetryConfig;
use crate::constants::retry as retry_constants;

/// Exponential backoff with symmetric jitter
pub struct BackoffScheduler {
    base: Duration,
    factor: f64,
    jitter: f64,
    min_delay: Duration,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for BackoffScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffScheduler")
            .field("base", &self.base)
            .field("factor", &self.factor)
            .field("jitter", &self.jitter)
            .field("min_delay", &self.min_delay)
            .finish_non_exhaustive()
    }
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(retry_constants::BASE_DELAY_MS),
            retry_constants::BACKOFF_FACTOR,
            retry_constants::JITTER,
            Duration::from_millis(retry_constants::MIN_DELAY_MS),
        )
    }
}

impl BackoffScheduler {
    /// Scheduler seeded from the OS
    pub fn new(base: Duration, factor: f64, jitter: f64, min_delay: Duration) -> Self {
        Self {
            base,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
            min_delay,
            rng: Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            config.backoff,
            config.jitter,
            Duration::from_millis(config.min_delay_ms),
        )
    }

    /// Replace the RNG with a deterministic one
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Un-jittered delay for attempt `attempt` (0-based), in milliseconds
    pub fn nominal_ms(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        self.base.as_millis() as f64 * self.factor.powi(exponent)
    }

    /// Inclusive bounds `delay(attempt)` can take
    pub fn bounds(&self, attempt: u32) -> (Duration, Duration) {
        let nominal = self.nominal_ms(attempt);
        let floor = self.min_delay.as_millis() as f64;
        let low = (nominal * (1.0 - self.jitter)).max(floor);
        let high = (nominal * (1.0 + self.jitter)).max(floor);
        (to_duration(low), to_duration(high))
    }

    /// Delay to sleep before the retry following attempt `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let u: f64 = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.random_range(-1.0..=1.0)
        };

        let jittered = self.nominal_ms(attempt) * (1.0 + u * self.jitter);
        to_duration(jittered.max(self.min_delay.as_millis() as f64))
    }
}

fn to_duration(ms: f64) -> Duration {
    if ms.is_finite() {
        // `as` saturates, so huge schedules clamp instead of panicking
        Duration::from_nanos((ms.max(0.0) * 1_000_000.0).round() as u64)
    } else {
        Duration::MAX
    }
}
