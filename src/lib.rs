//! AI POD Gateway - Resilient Multi-Provider AI Calls
//!
//! Every AI call an application makes goes through one [`Gateway`], which
//! decides whether the call may proceed, which (provider, model) targets to
//! try in which order, how often to retry each, and what to return when
//! everything fails. Callers always receive a [`CallResult`], never a panic
//! or an unhandled error.
//!
//! ## Core Features
//!
//! - **Circuit Breaker**: Sliding-window failure counting with half-open probes
//! - **Backoff Retries**: Exponential delays with bounded jitter
//! - **Model Fallback**: Ordered, deduplicated target sequences
//! - **Cooldown**: Global suppression after a failed call
//! - **Degraded Mode**: Mocked results when live calls are infeasible
//!
//! ## Quick Start
//!
//! ```ignore
//! use aipod_gateway::{CallRequest, Config, Gateway};
//!
//! let gateway = Gateway::from_config(Config::default())?;
//! let result = gateway
//!     .call(CallRequest::prompt("intel", "Be terse.", "Three headlines"))
//!     .await;
//! if result.ok {
//!     println!("{}", result.text.unwrap_or_default());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: Gateway, resilience primitives, transports
//! - [`config`]: Layered configuration
//! - [`types`]: Requests, results and errors

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, GatewayMode};

// Error Types
pub use types::{CallError, ErrorKind, GatewayError, Result, RetryPolicy};

// Requests and Results
pub use types::{
    AttemptRecord, CallOptions, CallOutcome, CallRequest, CallResult, CorrelationId,
    ProviderTarget,
};

// =============================================================================
// Gateway Re-exports
// =============================================================================

pub use ai::{
    // Resilience
    BackoffScheduler,
    CircuitBreaker,
    CircuitState,
    CooldownGuard,
    FallbackSequence,
    // Gateway
    Gateway,
    GatewayBuilder,
    // Metrics
    MetricsSummary,
    // Transports
    ProviderTransport,
    SharedTransport,
    // Telemetry
    SharedTelemetry,
    TelemetrySink,
};
