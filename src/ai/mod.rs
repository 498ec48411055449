//! AI Call Layer
//!
//! Resilience primitives and the gateway that composes them.

pub mod backoff;
pub mod cooldown;
pub mod gateway;
pub mod liveness;
pub mod metrics;
pub mod provider;
pub mod telemetry;
pub mod timeout;

pub use backoff::BackoffScheduler;
pub use cooldown::CooldownGuard;
pub use gateway::{Gateway, GatewayBuilder};
pub use liveness::Liveness;
pub use metrics::{MetricsCollector, MetricsSummary, SharedMetrics};
pub use provider::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    FallbackPlanner, FallbackSequence, GeminiTransport, ProviderTransport, ProxyTransport,
    SharedTransport, TransportReply, create_transport,
};
pub use telemetry::{NoopTelemetry, SharedTelemetry, TelemetrySink, TracingTelemetry};
pub use timeout::{TimeoutConfig, with_deadline};
