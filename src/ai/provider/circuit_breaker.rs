//! Circuit Breaker Pattern for Upstream Resilience
//!
//! Stops sending requests to a failing upstream once enough failures land
//! inside a sliding window, then probes for recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests flow through
//! - **Open**: Upstream is failing, requests are rejected immediately
//! - **HalfOpen**: Open, but the cool-off elapsed; limited probes are admitted
//!
//! ## Transitions
//!
//! ```text
//! Closed --[open_after failures within window]--> Open
//! Open --[half_open_after elapsed]--> HalfOpen (computed lazily)
//! HalfOpen --[close_after consecutive successes]--> Closed
//! HalfOpen --[failure]--> Open (fresh half_open_at)
//! ```
//!
//! Admission hands out a [`BreakerPermit`]. A half-open probe token lives in
//! the permit and is returned when the permit is dropped, so a cancelled
//! call cannot keep the breaker half-open forever.
//!
//! Time comes from `tokio::time::Instant` so tests can pause the clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{BreakerConfig, BreakerScope};
use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Upstream is failing - requests rejected immediately
    Open,
    /// Testing recovery - limited requests allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Sliding window for counting failures
    pub window: Duration,
    /// Failures inside the window before opening circuit
    pub open_after: u32,
    /// Time spent open before probes are admitted
    pub half_open_after: Duration,
    /// Consecutive successes needed to close an open circuit
    pub close_after: u32,
    /// Outstanding probes allowed while half-open
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(cb_constants::WINDOW_MS),
            open_after: cb_constants::OPEN_AFTER,
            half_open_after: Duration::from_millis(cb_constants::HALF_OPEN_AFTER_MS),
            close_after: cb_constants::CLOSE_AFTER,
            half_open_max_probes: cb_constants::HALF_OPEN_MAX_PROBES,
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms),
            open_after: config.open_after,
            half_open_after: Duration::from_millis(config.half_open_after_ms),
            close_after: config.close_after,
            half_open_max_probes: config.half_open_max_probes,
        }
    }
}

/// Unified internal state - all mutable state in single struct
/// to ensure atomicity of state transitions
#[derive(Debug)]
struct CircuitBreakerInner {
    failures: VecDeque<Instant>,
    open: bool,
    half_open_at: Option<Instant>,
    successes: u32,
    probes_in_flight: u32,
    /// Bumped whenever probe tokens are reset; stale permits release nothing
    probe_epoch: u64,
    blocked_count: u64,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            failures: VecDeque::new(),
            open: false,
            half_open_at: None,
            successes: 0,
            probes_in_flight: 0,
            probe_epoch: 0,
            blocked_count: 0,
        }
    }

    fn state_at(&self, now: Instant) -> CircuitState {
        match (self.open, self.half_open_at) {
            (false, _) => CircuitState::Closed,
            (true, Some(at)) if now >= at => CircuitState::HalfOpen,
            (true, _) => CircuitState::Open,
        }
    }

    fn evict_before(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.half_open_at = None;
        self.failures.clear();
        self.successes = 0;
        self.reset_probes();
    }

    fn reset_probes(&mut self) {
        self.probes_in_flight = 0;
        self.probe_epoch += 1;
    }

    fn release_probe(&mut self, epoch: u64) {
        if self.probe_epoch == epoch {
            self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
        }
    }
}

/// Thread-safe circuit breaker with unified state management.
///
/// All state is protected by a single Mutex so the window, the open flag and
/// the probe tokens always change together.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    scope: String,
    inner: Mutex<CircuitBreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for a scope
    pub fn new(scope: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            scope: scope.into(),
            inner: Mutex::new(CircuitBreakerInner::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(scope: impl Into<String>) -> Self {
        Self::new(scope, CircuitBreakerConfig::default())
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current circuit state; half-open is derived from the clock
    pub fn state(&self) -> CircuitState {
        self.lock().state_at(Instant::now())
    }

    /// Check if request should be allowed
    ///
    /// Returns a permit if the request can proceed. While half-open, each
    /// admitted request holds a probe token inside its permit until it
    /// reports back or the permit is dropped.
    #[must_use = "dropping the permit releases a half-open probe"]
    pub fn allow(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.lock();

        match inner.state_at(Instant::now()) {
            CircuitState::Closed => Some(BreakerPermit {
                breaker: self,
                probe: None,
            }),
            CircuitState::Open => {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Request blocked (circuit OPEN)",
                    self.scope
                );
                None
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_max_probes {
                    inner.probes_in_flight += 1;
                    tracing::info!(
                        "Circuit breaker [{}]: Admitting probe ({}/{})",
                        self.scope,
                        inner.probes_in_flight,
                        self.config.half_open_max_probes
                    );
                    Some(BreakerPermit {
                        breaker: self,
                        probe: Some(inner.probe_epoch),
                    })
                } else {
                    inner.blocked_count += 1;
                    tracing::debug!(
                        "Circuit breaker [{}]: Probe already in flight",
                        self.scope
                    );
                    None
                }
            }
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        self.succeed(None);
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        self.fail(None);
    }

    fn succeed(&self, probe: Option<u64>) {
        let mut inner = self.lock();

        if let Some(epoch) = probe {
            inner.release_probe(epoch);
        }
        inner.successes += 1;

        if inner.open && inner.successes >= self.config.close_after {
            inner.close();
            tracing::info!(
                "Circuit breaker [{}]: Closed (upstream recovered)",
                self.scope
            );
        }
    }

    fn fail(&self, probe: Option<u64>) {
        let now = Instant::now();
        let mut inner = self.lock();

        if let Some(epoch) = probe {
            inner.release_probe(epoch);
        }
        inner.failures.push_back(now);
        inner.evict_before(now, self.config.window);
        inner.successes = 0;
        inner.reset_probes();

        if inner.open {
            let was_probing = inner.state_at(now) == CircuitState::HalfOpen;
            inner.half_open_at = Some(now + self.config.half_open_after);
            if was_probing {
                tracing::warn!(
                    "Circuit breaker [{}]: Re-opened after failure in half-open state",
                    self.scope
                );
            }
        } else if inner.failures.len() >= self.config.open_after as usize {
            inner.open = true;
            inner.half_open_at = Some(now + self.config.half_open_after);
            tracing::warn!(
                "Circuit breaker [{}]: Opened after {} failures within {:?} (half-open in {:?})",
                self.scope,
                inner.failures.len(),
                self.config.window,
                self.config.half_open_after
            );
        }
    }

    fn abandon_probe(&self, epoch: u64) {
        self.lock().release_probe(epoch);
        tracing::debug!(
            "Circuit breaker [{}]: Probe abandoned before reporting",
            self.scope
        );
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> CircuitBreakerStats {
        let now = Instant::now();
        let inner = self.lock();

        let window_failures = inner
            .failures
            .iter()
            .filter(|&&at| now.duration_since(at) <= self.config.window)
            .count();

        CircuitBreakerStats {
            scope: self.scope.clone(),
            state: inner.state_at(now),
            window_failures,
            success_count: inner.successes,
            probes_in_flight: inner.probes_in_flight,
            blocked_count: inner.blocked_count,
            half_open_in: inner
                .half_open_at
                .filter(|_| inner.open)
                .map(|at| at.saturating_duration_since(now)),
        }
    }

    /// Force reset to closed state (for manual intervention)
    pub fn reset(&self) {
        self.lock().close();
        tracing::info!("Circuit breaker [{}]: Manually reset to CLOSED", self.scope);
    }
}

// =============================================================================
// Permit
// =============================================================================

/// Admission granted by [`CircuitBreaker::allow`]
///
/// Outcomes recorded through the permit go to its breaker. The first one
/// returns the probe token, if the permit holds one; dropping the permit
/// returns it otherwise.
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: Option<u64>,
}

impl BreakerPermit<'_> {
    /// Whether this permit was admitted as a half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn record_success(&mut self) {
        self.breaker.succeed(self.probe.take());
    }

    pub fn record_failure(&mut self) {
        self.breaker.fail(self.probe.take());
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if let Some(epoch) = self.probe.take() {
            self.breaker.abandon_probe(epoch);
        }
    }
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub scope: String,
    pub state: CircuitState,
    pub window_failures: usize,
    pub success_count: u32,
    pub probes_in_flight: u32,
    pub blocked_count: u64,
    /// Time left before probes are admitted, while open
    pub half_open_in: Option<Duration>,
}

impl CircuitBreakerStats {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let wait_str = self
            .half_open_in
            .filter(|d| !d.is_zero())
            .map(|d| format!(" half-open in {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();

        format!(
            "[{}] {} | failures={} successes={} probes={} blocked={}{}",
            self.scope,
            self.state,
            self.window_failures,
            self.success_count,
            self.probes_in_flight,
            self.blocked_count,
            wait_str
        )
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One breaker per scope key, created on first use
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    scope: BreakerScope,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, scope: BreakerScope) -> Self {
        Self {
            config,
            scope,
            breakers: DashMap::new(),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(CircuitBreakerConfig::from(config), config.scope)
    }

    /// Registry key for a provider under the configured scope
    pub fn scope_key<'a>(&self, provider: &'a str) -> &'a str {
        match self.scope {
            BreakerScope::Global => cb_constants::GLOBAL_SCOPE,
            BreakerScope::Provider => provider,
        }
    }

    /// Breaker guarding calls to `provider`
    pub fn for_provider(&self, provider: &str) -> Arc<CircuitBreaker> {
        let key = self.scope_key(provider);
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config.clone())))
            .clone()
    }

    /// Stats for every breaker created so far, sorted by scope
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|entry| entry.stats()).collect();
        stats.sort_by(|a, b| a.scope.cmp(&b.scope));
        stats
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.reset();
        }
    }
}
