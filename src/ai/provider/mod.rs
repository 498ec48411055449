//! Provider Transport Abstraction
//!
//! Defines the `ProviderTransport` trait the gateway sends attempts through.
//! Transports are stateless with respect to resilience: retries, breakers
//! and fallback live in the gateway. A transport only maps one attempt to a
//! `TransportReply` or a typed `CallError`.
//!
//! ## Modules
//!
//! - `chain`: Ordered, deduplicated fallback target sequence
//! - `circuit_breaker`: Circuit breaker pattern for upstream resilience
//! - `envelope`: Gemini-style contents/candidates helpers
//! - `proxy`: Serverless proxy transport (default)
//! - `gemini`: Direct Gemini `generateContent` transport

mod chain;
mod circuit_breaker;
pub mod envelope;
mod gemini;
mod proxy;

pub use chain::{FallbackPlanner, FallbackSequence};
pub use circuit_breaker::{
    BreakerPermit, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitState,
};
pub use gemini::GeminiTransport;
pub use proxy::ProxyTransport;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, TransportKind};
use crate::types::{CallError, CallRequest, GatewayError, ProviderTarget, Result};

// =============================================================================
// Transport Reply
// =============================================================================

/// Successful upstream answer, flattened
#[derive(Debug, Clone)]
pub struct TransportReply {
    /// Upstream payload
    pub data: Value,
    /// Primary text (empty when the upstream returned none)
    pub text: String,
    /// Model reported by the upstream, overriding the requested one
    pub model: Option<String>,
    /// The upstream answered from its own degraded path
    pub mocked: bool,
}

impl TransportReply {
    pub fn new(data: Value, text: impl Into<String>) -> Self {
        Self {
            data,
            text: text.into(),
            model: None,
            mocked: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn mocked(mut self, mocked: bool) -> Self {
        self.mocked = mocked;
        self
    }
}

// =============================================================================
// Provider Transport Trait
// =============================================================================

/// One attempt against one upstream target
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Send `request` to `target`, honoring `deadline` where the client can.
    ///
    /// The gateway also races the returned future against the deadline, so
    /// implementations need not be exact.
    async fn send(
        &self,
        target: &ProviderTarget,
        request: &CallRequest,
        deadline: Duration,
    ) -> std::result::Result<TransportReply, CallError>;

    /// Transport name for logging
    fn name(&self) -> &str;

    /// Whether this transport can reach `provider`
    fn serves(&self, _provider: &str) -> bool {
        true
    }
}

/// Shared transport type for concurrent callers.
pub type SharedTransport = Arc<dyn ProviderTransport>;

/// Build the HTTP client shared by the reqwest-based transports
pub(crate) fn http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(GatewayError::Http)
}

/// Create the default transport from configuration
pub fn create_transport(config: &Config) -> Result<SharedTransport> {
    match config.gateway.transport {
        TransportKind::Proxy => Ok(Arc::new(ProxyTransport::from_config(config)?)),
        TransportKind::Gemini => Ok(Arc::new(GeminiTransport::from_config(config)?)),
    }
}
