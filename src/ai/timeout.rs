//! Attempt Deadlines
//!
//! Every transport attempt races a deadline. Expiry drops the in-flight
//! future (cancelling the request) and surfaces as `network_timeout`, which
//! counts toward retry, fallback and breaker accounting like any failure.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::{TimeoutConfig, with_deadline};
//!
//! let deadline = TimeoutConfig::from_config(&config.gateway).attempt_deadline(&options);
//! let reply = with_deadline(deadline, transport.send(&target, &request, deadline)).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::constants::network as net_constants;
use crate::types::{CallError, CallOptions};

/// Timeouts applied to upstream calls
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Deadline for one attempt (default: 40 seconds)
    pub attempt: Duration,
    /// TCP connect timeout (default: 5 seconds)
    pub connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt: Duration::from_millis(net_constants::OVERALL_TIMEOUT_MS),
            connect: Duration::from_millis(net_constants::CONNECT_TIMEOUT_MS),
        }
    }
}

impl TimeoutConfig {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            attempt: config.overall_timeout(),
            connect: config.connect_timeout(),
        }
    }

    /// Per-call override wins; a zero override is ignored
    pub fn attempt_deadline(&self, options: &CallOptions) -> Duration {
        options
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(self.attempt)
    }
}

/// Execute an attempt with a deadline
///
/// Returns `network_timeout` if the attempt doesn't complete in time.
pub async fn with_deadline<T, F>(deadline: Duration, future: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(CallError::network_timeout(deadline)),
    }
}
