//! AI Call Gateway
//!
//! Composition root for one resilient AI call:
//!
//! 1. Mock decision (no network when live calls are infeasible)
//! 2. Global cooldown check
//! 3. Fallback sequence for the call
//! 4. Per target: breaker admission, then up to `retries + 1` attempts with
//!    jittered backoff, each bound to a deadline
//! 5. Terminal outcome reported to metrics and telemetry
//!
//! `Gateway::call` never fails: every outcome, including circuit-open,
//! cooldown and mock, is a `CallResult`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::backoff::BackoffScheduler;
use super::cooldown::CooldownGuard;
use super::liveness::Liveness;
use super::metrics::{MetricsCollector, MetricsSummary, SharedMetrics};
use super::provider::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerStats, FallbackPlanner, SharedTransport,
    create_transport,
};
use super::telemetry::{
    NoopTelemetry, SharedTelemetry, TaskEvent, TaskState, TracingTelemetry, UsageEvent, detail_of,
};
use super::timeout::{TimeoutConfig, with_deadline};
use crate::config::{Config, GatewayMode};
use crate::constants::events;
use crate::types::{
    AttemptRecord, CallError, CallOutcome, CallRequest, CallResult, ProviderTarget, Result,
    RetryPolicy,
};

/// Resilient multi-provider AI gateway
///
/// Share one instance (behind `Arc`) across callers: breaker and cooldown
/// state is per gateway.
pub struct Gateway {
    config: Config,
    liveness: Liveness,
    planner: FallbackPlanner,
    breakers: BreakerRegistry,
    cooldown: CooldownGuard,
    backoff: BackoffScheduler,
    timeouts: TimeoutConfig,
    transports: HashMap<String, SharedTransport>,
    default_transport: Option<SharedTransport>,
    telemetry: SharedTelemetry,
    metrics: SharedMetrics,
}

impl Gateway {
    pub fn builder(config: Config) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Gateway from configuration with the configured default transport
    pub fn from_config(config: Config) -> Result<Self> {
        GatewayBuilder::new(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether calls currently take the degraded path
    pub fn is_mocking(&self) -> bool {
        self.liveness.should_mock()
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.snapshot()
    }

    /// Breaker guarding calls to `provider` under the configured scope
    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers.for_provider(provider)
    }

    pub fn breaker_stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.stats()
    }

    pub fn reset_breakers(&self) {
        self.breakers.reset_all();
    }

    pub fn cooldown(&self) -> &CooldownGuard {
        &self.cooldown
    }

    /// Execute one AI call; never fails
    pub async fn call(&self, request: CallRequest) -> CallResult {
        self.call_with_attempts(request).await.result
    }

    /// Execute one AI call and return the attempt records with the result
    #[instrument(skip_all, fields(task = %request.task, correlation_id = %request.correlation_id))]
    pub async fn call_with_attempts(&self, request: CallRequest) -> CallOutcome {
        let tracked = request.options.tracking();
        if tracked {
            let event = TaskEvent::new(&request.correlation_id, TaskState::Start, &request.options.meta);
            self.emit(events::TASK, detail_of(&event));
        }

        let outcome = self.execute(&request).await;

        self.metrics.record_outcome(&outcome);
        self.emit_usage(&request, &outcome);
        if tracked {
            let mut event = TaskEvent::new(&request.correlation_id, TaskState::End, &request.options.meta);
            event.ok = Some(outcome.result.ok);
            self.emit(events::TASK, detail_of(&event));
        }

        outcome
    }

    async fn execute(&self, request: &CallRequest) -> CallOutcome {
        let correlation_id = request.correlation_id.clone();

        if self.liveness.should_mock() {
            debug!(mode = %self.liveness.mode(), "Serving mocked result");
            return CallOutcome {
                result: CallResult::mocked(
                    request.options.model.clone(),
                    request.echo_payload(),
                    correlation_id,
                ),
                attempts: Vec::new(),
            };
        }

        if let Some(remaining) = self.cooldown.remaining() {
            debug!(remaining_ms = remaining.as_millis() as u64, "Call suppressed by cooldown");
            return CallOutcome {
                result: CallResult::failure(CallError::cooldown_active(remaining), correlation_id),
                attempts: Vec::new(),
            };
        }

        let sequence = self.planner.plan(&request.options);
        let deadline = self.timeouts.attempt_deadline(&request.options);
        let retries = self.config.retry.retries;
        let policy = self.config.retry.policy;

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<CallError> = None;
        let mut previous: Option<&ProviderTarget> = None;

        for target in &sequence {
            let breaker = self.breakers.for_provider(&target.provider);
            // Dropped with this iteration, or with the whole call if it is cancelled
            let Some(mut permit) = breaker.allow() else {
                debug!(target = %target, "Skipping target (circuit OPEN)");
                continue;
            };

            if let Some(from) = previous {
                self.emit(
                    events::FALLBACK,
                    json!({
                        "from": from.to_string(),
                        "to": target.to_string(),
                        "reason": last_error.as_ref().map(CallError::code),
                        "correlationId": correlation_id,
                    }),
                );
            }
            previous = Some(target);

            let Some(transport) = self.transport_for(&target.provider) else {
                let err = CallError::transport_unavailable(&target.provider).with_target(target.clone());
                warn!(target = %target, "No transport for provider");
                permit.record_failure();
                attempts.push(AttemptRecord {
                    target: target.clone(),
                    index: 0,
                    started_at: Utc::now(),
                    elapsed: std::time::Duration::ZERO,
                    error: Some(err.clone()),
                });
                last_error = Some(err);
                continue;
            };

            for attempt in 0..=retries {
                debug!(
                    target = %target,
                    transport = transport.name(),
                    attempt,
                    max_retries = retries,
                    "Gateway attempt"
                );

                let started_at = Utc::now();
                let start = Instant::now();
                let outcome = with_deadline(deadline, transport.send(target, request, deadline)).await;
                let elapsed = start.elapsed();

                match outcome {
                    Ok(reply) => {
                        permit.record_success();
                        attempts.push(AttemptRecord {
                            target: target.clone(),
                            index: attempt,
                            started_at,
                            elapsed,
                            error: None,
                        });

                        let model = reply.model.unwrap_or_else(|| target.model.clone());
                        info!(
                            target = %target,
                            model_used = %model,
                            attempts = attempts.len(),
                            "Gateway call succeeded"
                        );
                        let mut result =
                            CallResult::success(reply.data, reply.text, model, correlation_id);
                        result.mocked = reply.mocked;
                        return CallOutcome { result, attempts };
                    }
                    Err(err) => {
                        let err = if err.target.is_some() {
                            err
                        } else {
                            err.with_target(target.clone())
                        };
                        permit.record_failure();
                        warn!(
                            target = %target,
                            attempt,
                            error = %err,
                            circuit = %breaker.state(),
                            "Attempt failed"
                        );

                        attempts.push(AttemptRecord {
                            target: target.clone(),
                            index: attempt,
                            started_at,
                            elapsed,
                            error: Some(err.clone()),
                        });

                        let retryable = policy.is_retryable(&err);
                        last_error = Some(err);

                        if !retryable {
                            info!(target = %target, policy = %policy, "Error not retryable, advancing");
                            break;
                        }
                        if attempt < retries {
                            let delay = self.backoff.delay(attempt);
                            debug!(delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        let Some(error) = last_error else {
            // Every target was rejected by its breaker before any I/O
            info!(targets = sequence.len(), "All targets blocked by circuit breaker");
            return CallOutcome {
                result: CallResult::failure(CallError::circuit_open(), correlation_id),
                attempts,
            };
        };

        self.cooldown.mark_failure();
        warn!(
            error = %error,
            attempts = attempts.len(),
            "All fallback targets exhausted"
        );
        CallOutcome {
            result: CallResult::failure(error, correlation_id),
            attempts,
        }
    }

    fn transport_for(&self, provider: &str) -> Option<&SharedTransport> {
        self.transports
            .get(provider)
            .or(self.default_transport.as_ref())
            .filter(|transport| transport.serves(provider))
    }

    fn emit_usage(&self, request: &CallRequest, outcome: &CallOutcome) {
        let result = &outcome.result;
        let event = UsageEvent {
            task: &request.task,
            model_used: result.model.as_deref(),
            provider: outcome.attempts.last().map(|a| a.target.provider.as_str()),
            ok: result.ok,
            mocked: result.mocked,
            attempts: outcome.attempts.len(),
            ts: Utc::now(),
            correlation_id: &request.correlation_id,
            error: None,
            meta: &request.options.meta,
        }
        .with_error(result.error.as_ref());

        self.emit(events::USAGE, detail_of(&event));
    }

    /// Hand one event to the sink; a panicking sink loses the event only
    fn emit(&self, event: &str, detail: Value) {
        if catch_unwind(AssertUnwindSafe(|| self.telemetry.emit(event, detail))).is_err() {
            warn!(event, "Telemetry sink panicked, event dropped");
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for creating gateways
pub struct GatewayBuilder {
    config: Config,
    transports: HashMap<String, SharedTransport>,
    default_transport: Option<SharedTransport>,
    telemetry: Option<SharedTelemetry>,
    seed: Option<u64>,
    liveness: Option<Liveness>,
}

impl GatewayBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transports: HashMap::new(),
            default_transport: None,
            telemetry: None,
            seed: None,
            liveness: None,
        }
    }

    /// Transport serving one provider name
    pub fn transport(mut self, provider: impl Into<String>, transport: SharedTransport) -> Self {
        self.transports.insert(provider.into(), transport);
        self
    }

    /// Transport serving every provider without a dedicated one
    pub fn default_transport(mut self, transport: SharedTransport) -> Self {
        self.default_transport = Some(transport);
        self
    }

    pub fn telemetry(mut self, sink: SharedTelemetry) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Deterministic backoff jitter
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn mode(mut self, mode: GatewayMode) -> Self {
        self.config.gateway.mode = mode;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry.policy = policy;
        self
    }

    /// Skip environment credential detection
    pub fn credentials_present(mut self, present: bool) -> Self {
        self.liveness = Some(Liveness::new(self.config.gateway.mode, present));
        self
    }

    /// Validate configuration and build the gateway
    pub fn build(self) -> Result<Gateway> {
        let config = self.config;
        config.validate()?;

        let liveness = match self.liveness {
            Some(liveness) => Liveness::new(config.gateway.mode, liveness.has_credentials()),
            None => Liveness::detect(config.gateway.mode, &config.credentials),
        };

        // The configured transport is only built when the caller registered
        // none and the gateway can go live
        let default_transport = match self.default_transport {
            Some(transport) => Some(transport),
            None if liveness.should_mock() || !self.transports.is_empty() => None,
            None => Some(create_transport(&config)?),
        };

        let telemetry: SharedTelemetry = match self.telemetry {
            Some(sink) => sink,
            None if config.telemetry.enabled => Arc::new(TracingTelemetry),
            None => Arc::new(NoopTelemetry),
        };

        let backoff = BackoffScheduler::from_config(&config.retry);
        let backoff = match self.seed {
            Some(seed) => backoff.with_seed(seed),
            None => backoff,
        };

        info!(
            mode = %config.gateway.mode,
            mocking = liveness.should_mock(),
            retries = config.retry.retries,
            policy = %config.retry.policy,
            "Gateway ready"
        );

        Ok(Gateway {
            planner: FallbackPlanner::from_config(&config.fallback)?,
            breakers: BreakerRegistry::from_config(&config.breaker),
            cooldown: CooldownGuard::from_millis(config.cooldown.cooldown_ms),
            timeouts: TimeoutConfig::from_config(&config.gateway),
            backoff,
            liveness,
            transports: self.transports,
            default_transport,
            telemetry,
            metrics: Arc::new(MetricsCollector::new()),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{CircuitState, ProviderTransport, TransportReply};
    use crate::ai::telemetry::{RecordingTelemetry, TelemetrySink};
    use crate::config::BreakerScope;
    use crate::types::{CallOptions, ErrorKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Step {
        Succeed,
        Fail(CallError),
        SucceedAfter(Duration),
        SucceedMocked,
    }

    /// Transport replaying a per-model script; unscripted calls succeed
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<HashMap<String, VecDeque<Step>>>,
        calls: Mutex<Vec<ProviderTarget>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self::default()
        }

        fn script(self, model: &str, steps: Vec<Step>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(model.to_string(), steps.into());
            self
        }

        fn failing(self, model: &str, error: CallError, times: usize) -> Self {
            self.script(model, vec![Step::Fail(error); times])
        }

        fn calls(&self) -> Vec<ProviderTarget> {
            self.calls.lock().unwrap().clone()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ProviderTransport for ScriptedTransport {
        async fn send(
            &self,
            target: &ProviderTarget,
            _request: &CallRequest,
            _deadline: Duration,
        ) -> std::result::Result<TransportReply, CallError> {
            self.calls.lock().unwrap().push(target.clone());
            let step = self
                .script
                .lock()
                .unwrap()
                .get_mut(&target.model)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Step::Succeed);

            let reply = TransportReply::new(
                json!({"answer": target.model}),
                format!("reply from {}", target.model),
            );
            match step {
                Step::Succeed => {}
                Step::Fail(err) => return Err(err),
                Step::SucceedAfter(delay) => tokio::time::sleep(delay).await,
                Step::SucceedMocked => return Ok(reply.mocked(true)),
            }
            Ok(reply)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn scenario_config() -> Config {
        let mut config = Config::default();
        config.retry.retries = 3;
        config.breaker.open_after = 5;
        config.breaker.window_ms = 60_000;
        config.breaker.half_open_after_ms = 30_000;
        config.breaker.close_after = 2;
        config.cooldown.cooldown_ms = 0;
        config.fallback.defaults = vec!["A".to_string(), "B".to_string()];
        config
    }

    fn gateway(config: Config, transport: Arc<ScriptedTransport>) -> (Gateway, Arc<RecordingTelemetry>) {
        let telemetry = Arc::new(RecordingTelemetry::new());
        let gateway = Gateway::builder(config)
            .mode(GatewayMode::Live)
            .default_transport(transport)
            .telemetry(telemetry.clone())
            .seed(7)
            .build()
            .unwrap();
        (gateway, telemetry)
    }

    fn request() -> CallRequest {
        CallRequest::prompt("intel", "Be terse.", "Three headlines")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_target() {
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(scenario_config(), transport.clone());

        let outcome = gateway.call_with_attempts(request()).await;

        assert!(outcome.result.ok);
        assert!(!outcome.result.mocked);
        assert_eq!(outcome.result.model.as_deref(), Some("A"));
        assert_eq!(outcome.result.text.as_deref(), Some("reply from A"));
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_retry_budget() {
        // A fails 1 initial + 3 retries, B succeeds first time
        let transport = Arc::new(ScriptedTransport::new().failing("A", CallError::http(503, ""), 4));
        let (gateway, telemetry) = gateway(scenario_config(), transport.clone());

        let outcome = gateway.call_with_attempts(request()).await;

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.model.as_deref(), Some("B"));
        assert_eq!(outcome.attempt_count(), 5);
        assert_eq!(
            outcome.visited_targets(),
            vec![ProviderTarget::new("gemini", "A"), ProviderTarget::new("gemini", "B")]
        );
        assert_eq!(outcome.attempts[3].index, 3);

        let fallbacks = telemetry.named(events::FALLBACK);
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0]["from"], "gemini:A");
        assert_eq!(fallbacks[0]["reason"], "http_503");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_typed_error() {
        let mut config = scenario_config();
        config.breaker.open_after = 50;
        let transport = Arc::new(
            ScriptedTransport::new()
                .failing("A", CallError::http(500, "boom"), 4)
                .script(
                    "B",
                    vec![
                        Step::Fail(CallError::http(502, "")),
                        Step::Fail(CallError::unknown("reset")),
                        Step::Fail(CallError::http(500, "")),
                        Step::Fail(CallError::http(429, "slow down")),
                    ],
                ),
        );
        let (gateway, _) = gateway(config, transport.clone());

        let outcome = gateway.call_with_attempts(request()).await;
        let error = outcome.result.error.as_ref().unwrap();

        assert!(!outcome.result.ok);
        assert_eq!(error.kind, ErrorKind::Http(429));
        assert_eq!(error.message, "slow down");
        assert_eq!(error.target, Some(ProviderTarget::new("gemini", "B")));
        assert_eq!(outcome.result.model.as_deref(), Some("B"));
        // Bounded by (retries + 1) * |targets|
        assert_eq!(outcome.attempt_count(), 8);
        assert_eq!(transport.call_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_short_circuits() {
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(scenario_config(), transport.clone());
        let breaker = gateway.breaker("gemini");

        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.allow().is_some());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let outcome = gateway.call_with_attempts(request()).await;
        assert!(!outcome.result.ok);
        assert_eq!(outcome.result.error_code().as_deref(), Some("circuit_open"));
        assert_eq!(outcome.attempt_count(), 0);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(gateway.metrics().circuit_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_then_close() {
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(scenario_config(), transport.clone());
        let breaker = gateway.breaker("gemini");
        for _ in 0..5 {
            breaker.record_failure();
        }

        tokio::time::advance(Duration::from_millis(30_000)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(gateway.call(request()).await.ok);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(gateway.call(request()).await.ok);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().window_failures, 0);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_half_open_call_frees_breaker() {
        let mut config = scenario_config();
        config.retry.retries = 0;
        let transport = Arc::new(
            ScriptedTransport::new().script("A", vec![Step::SucceedAfter(Duration::from_millis(500))]),
        );
        let (gateway, _) = gateway(config, transport.clone());
        let breaker = gateway.breaker("gemini");
        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_millis(30_000)).await;

        let abandoned = tokio::time::timeout(Duration::from_millis(100), gateway.call(request())).await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.stats().probes_in_flight, 0);

        let later = gateway.call(request()).await;
        assert!(later.ok);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe_concurrently() {
        let transport = Arc::new(ScriptedTransport::new().script(
            "A",
            vec![Step::SucceedAfter(Duration::from_millis(500))],
        ));
        let (gateway, _) = gateway(scenario_config(), transport.clone());
        let breaker = gateway.breaker("gemini");
        for _ in 0..5 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_millis(30_000)).await;

        let calls = (0..5).map(|_| gateway.call(request()));
        let results = futures::future::join_all(calls).await;

        let ok = results.iter().filter(|r| r.ok).count();
        let rejected = results
            .iter()
            .filter(|r| r.error_code().as_deref() == Some("circuit_open"))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(rejected, 4);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_provider_scope_isolates_failures() {
        let mut config = scenario_config();
        config.breaker.scope = BreakerScope::Provider;
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(config, transport.clone());

        for _ in 0..5 {
            gateway.breaker("openai").record_failure();
        }

        let options = CallOptions::default().with_fallback(vec![
            ProviderTarget::new("openai", "gpt-4o"),
            ProviderTarget::new("gemini", "A"),
        ]);
        let outcome = gateway.call_with_attempts(request().options(options)).await;

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.model.as_deref(), Some("A"));
        assert_eq!(transport.calls(), vec![ProviderTarget::new("gemini", "A")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_path_without_credentials() {
        let mut config = scenario_config();
        config.gateway.mode = GatewayMode::Auto;
        config.credentials.env_vars = vec!["AIPOD_TEST_DEFINITELY_UNSET_KEY".to_string()];
        config.credentials.api_key = None;

        let transport = Arc::new(ScriptedTransport::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let gateway = Gateway::builder(config)
            .default_transport(transport.clone())
            .telemetry(telemetry.clone())
            .build()
            .unwrap();
        assert!(gateway.is_mocking());

        let payload = json!({"contents": [{"parts": [{"text": "original"}]}]});
        let result = gateway.call(CallRequest::new("intel").raw(payload.clone())).await;

        assert!(result.ok);
        assert!(result.mocked);
        assert_eq!(result.data.as_ref().unwrap()["echo"], payload);
        assert_eq!(transport.call_count(), 0);

        let usage = telemetry.named(events::USAGE);
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0]["mocked"], true);
        assert_eq!(usage[0]["attempts"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_mode_with_credentials_goes_live() {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = Gateway::builder(scenario_config())
            .mode(GatewayMode::Auto)
            .credentials_present(true)
            .default_transport(transport.clone())
            .telemetry(Arc::new(NoopTelemetry))
            .build()
            .unwrap();

        assert!(!gateway.is_mocking());
        assert!(!gateway.call(request()).await.mocked);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_mode_needs_no_transport() {
        let gateway = Gateway::builder(scenario_config())
            .mode(GatewayMode::Mock)
            .telemetry(Arc::new(NoopTelemetry))
            .build()
            .unwrap();

        let result = gateway.call(request()).await;
        assert!(result.mocked);
        assert_eq!(
            result.data.unwrap()["echo"],
            json!({"task": "intel", "system": "Be terse.", "user": "Three headlines"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_after_failed_call() {
        let mut config = scenario_config();
        config.cooldown.cooldown_ms = 15_000;
        config.breaker.open_after = 50;
        config.retry.retries = 0;
        let transport = Arc::new(
            ScriptedTransport::new()
                .failing("A", CallError::http(500, ""), 1)
                .failing("B", CallError::http(500, ""), 1),
        );
        let (gateway, _) = gateway(config, transport.clone());

        assert!(!gateway.call(request()).await.ok);
        assert_eq!(transport.call_count(), 2);

        let suppressed = gateway.call(request()).await;
        assert_eq!(suppressed.error_code().as_deref(), Some("cooldown_active"));
        assert_eq!(transport.call_count(), 2);

        tokio::time::advance(Duration::from_millis(15_000)).await;
        assert!(gateway.call(request()).await.ok);
        assert_eq!(gateway.metrics().cooldown_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_precedes_open_breaker() {
        let mut config = scenario_config();
        config.cooldown.cooldown_ms = 15_000;
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(config, transport);

        for _ in 0..5 {
            gateway.breaker("gemini").record_failure();
        }
        gateway.cooldown().mark_failure();

        let result = gateway.call(request()).await;
        assert_eq!(result.error_code().as_deref(), Some("cooldown_active"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_policy_does_not_retry_bad_request() {
        let transport = Arc::new(ScriptedTransport::new().failing("A", CallError::http(400, "bad"), 4));
        let mut config = scenario_config();
        config.retry.policy = RetryPolicy::Strict;
        let (gateway, _) = gateway(config, transport.clone());

        let outcome = gateway.call_with_attempts(request()).await;

        assert!(outcome.result.ok);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(outcome.attempts[0].error.as_ref().unwrap().kind, ErrorKind::Http(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permissive_policy_retries_bad_request() {
        let transport = Arc::new(ScriptedTransport::new().failing("A", CallError::http(400, "bad"), 2));
        let (gateway, _) = gateway(scenario_config(), transport.clone());

        let outcome = gateway.call_with_attempts(request()).await;

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.model.as_deref(), Some("A"));
        assert_eq!(outcome.attempt_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_provider_is_transport_unavailable() {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = Gateway::builder(scenario_config())
            .mode(GatewayMode::Live)
            .transport("gemini", transport.clone())
            .telemetry(Arc::new(NoopTelemetry))
            .build()
            .unwrap();

        let options =
            CallOptions::default().with_fallback(vec![ProviderTarget::new("acme", "rocket-1")]);
        let outcome = gateway.call_with_attempts(request().options(options)).await;

        let error = outcome.result.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::TransportUnavailable);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_network_timeout() {
        let mut config = scenario_config();
        config.retry.retries = 1;
        config.fallback.defaults = vec!["A".to_string()];
        let transport = Arc::new(ScriptedTransport::new().script(
            "A",
            vec![
                Step::SucceedAfter(Duration::from_secs(5)),
                Step::SucceedAfter(Duration::from_secs(5)),
            ],
        ));
        let (gateway, _) = gateway(config, transport.clone());

        let options = CallOptions::default().with_timeout(Duration::from_millis(100));
        let outcome = gateway.call_with_attempts(request().options(options)).await;

        assert!(!outcome.result.ok);
        assert_eq!(outcome.result.error.as_ref().unwrap().kind, ErrorKind::NetworkTimeout);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(gateway.breaker("gemini").stats().window_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_model_goes_first() {
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, _) = gateway(scenario_config(), transport.clone());

        let options = CallOptions::default().with_model("C");
        let result = gateway.call(request().options(options)).await;

        assert_eq!(result.model.as_deref(), Some("C"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_events_for_tracked_calls() {
        let transport = Arc::new(ScriptedTransport::new());
        let (gateway, telemetry) = gateway(scenario_config(), transport);

        let options = CallOptions::default().with_meta(json!({"track": true, "scope": "intel"}));
        let request = request().options(options);
        let id = request.correlation_id.clone();
        gateway.call(request).await;

        let tasks = telemetry.named(events::TASK);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0]["state"], "start");
        assert_eq!(tasks[1]["state"], "end");
        assert_eq!(tasks[1]["ok"], true);
        assert_eq!(tasks[1]["id"], id.as_str());

        let usage = telemetry.named(events::USAGE);
        assert_eq!(usage[0]["modelUsed"], "A");
        assert_eq!(usage[0]["provider"], "gemini");
        assert_eq!(usage[0]["meta"]["scope"], "intel");

        // Silent calls report usage only
        let silent = CallOptions::default().with_meta(json!({"track": true, "silent": true}));
        gateway.call(CallRequest::new("quiet").options(silent)).await;
        assert_eq!(telemetry.named(events::TASK).len(), 2);
        assert_eq!(telemetry.named(events::USAGE).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_mock_reply_is_marked_mocked() {
        let transport = Arc::new(ScriptedTransport::new().script("A", vec![Step::SucceedMocked]));
        let (gateway, telemetry) = gateway(scenario_config(), transport);

        let result = gateway.call(request()).await;

        assert!(result.ok);
        assert!(result.mocked);
        assert_eq!(telemetry.named(events::USAGE)[0]["mocked"], true);
    }

    #[tokio::test]
    async fn test_gemini_transport_only_serves_gemini_targets() {
        use crate::ai::provider::GeminiTransport;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/A:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "hi"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = scenario_config();
        config.retry.retries = 0;
        let transport =
            GeminiTransport::new("test-key", server.uri(), "v1beta", Duration::from_secs(5)).unwrap();
        let gateway = Gateway::builder(config)
            .mode(GatewayMode::Live)
            .default_transport(Arc::new(transport))
            .telemetry(Arc::new(NoopTelemetry))
            .build()
            .unwrap();

        let options = CallOptions::default().with_fallback(vec![
            ProviderTarget::new("openai", "gpt-4o"),
            ProviderTarget::new("gemini", "A"),
        ]);
        let outcome = gateway.call_with_attempts(request().options(options)).await;

        assert!(outcome.result.ok);
        assert_eq!(outcome.result.text.as_deref(), Some("hi"));
        assert_eq!(outcome.attempt_count(), 2);
        let first = outcome.attempts[0].error.as_ref().unwrap();
        assert_eq!(first.kind, ErrorKind::TransportUnavailable);
        assert_eq!(outcome.attempts[1].target.provider, "gemini");
    }

    struct PanickingTelemetry;

    impl TelemetrySink for PanickingTelemetry {
        fn emit(&self, event: &str, _detail: Value) {
            panic!("sink rejected {event}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_sink_does_not_fail_call() {
        let transport = Arc::new(
            ScriptedTransport::new().failing("A", CallError::http(503, "unavailable"), 4),
        );
        let gateway = Gateway::builder(scenario_config())
            .mode(GatewayMode::Live)
            .default_transport(transport.clone())
            .telemetry(Arc::new(PanickingTelemetry))
            .build()
            .unwrap();

        let options = CallOptions::default().with_meta(json!({"track": true}));
        let result = gateway.call(request().options(options)).await;

        // The fallback event is lost, the call is not
        assert!(result.ok);
        assert_eq!(result.model.as_deref(), Some("B"));
        assert_eq!(gateway.breaker("gemini").stats().window_failures, 4);
        assert_eq!(gateway.metrics().calls, 1);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.retry.jitter = 3.0;
        assert!(Gateway::builder(config).mode(GatewayMode::Mock).build().is_err());
    }
}
