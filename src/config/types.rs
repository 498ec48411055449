//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global and project (.aipod/) level configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    circuit_breaker as cb_constants, cooldown as cooldown_constants,
    fallback as fallback_constants, mock as mock_constants, network as net_constants,
    retry as retry_constants,
};
use crate::types::{GatewayError, Result, RetryPolicy};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Live/mock switch and transport selection
    pub gateway: GatewayConfig,

    /// Retry scheduling
    pub retry: RetryConfig,

    /// Circuit breaker
    pub breaker: BreakerConfig,

    /// Global cooldown after failed calls
    pub cooldown: CooldownConfig,

    /// Target sequencing
    pub fallback: FallbackConfig,

    /// Credential discovery for the live/mock decision
    pub credentials: CredentialsConfig,

    /// Direct Gemini transport
    pub gemini: GeminiConfig,

    /// Telemetry sink
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            gateway: GatewayConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            cooldown: CooldownConfig::default(),
            fallback: FallbackConfig::default(),
            credentials: CredentialsConfig::default(),
            gemini: GeminiConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `GatewayError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(GatewayError::config(format!(
                "retry.jitter must be in [0.0, 1.0), got {}",
                self.retry.jitter
            )));
        }

        if self.retry.backoff < 1.0 {
            return Err(GatewayError::config(format!(
                "retry.backoff must be at least 1.0, got {}",
                self.retry.backoff
            )));
        }

        if self.gateway.overall_timeout_ms == 0 {
            return Err(GatewayError::config(
                "gateway.overall_timeout_ms must be greater than 0",
            ));
        }

        if self.breaker.open_after == 0 {
            return Err(GatewayError::config(
                "breaker.open_after must be greater than 0",
            ));
        }

        if self.breaker.close_after == 0 {
            return Err(GatewayError::config(
                "breaker.close_after must be greater than 0",
            ));
        }

        if self.breaker.half_open_max_probes == 0 {
            return Err(GatewayError::config(
                "breaker.half_open_max_probes must be greater than 0",
            ));
        }

        if self.fallback.max_targets == 0 {
            return Err(GatewayError::config(
                "fallback.max_targets must be greater than 0",
            ));
        }

        if self.fallback.defaults.is_empty() {
            return Err(GatewayError::config(
                "fallback.defaults must name at least one target",
            ));
        }

        for entry in &self.fallback.defaults {
            crate::types::ProviderTarget::parse(entry, &self.fallback.default_provider)
                .map_err(|e| GatewayError::config(format!("fallback.defaults: {}", e)))?;
        }

        for pattern in &self.fallback.allowed_models {
            regex::Regex::new(pattern).map_err(|e| {
                GatewayError::config(format!(
                    "fallback.allowed_models contains invalid pattern '{}': {}",
                    pattern, e
                ))
            })?;
        }

        url::Url::parse(&self.gateway.base_url).map_err(|e| {
            GatewayError::config(format!(
                "gateway.base_url '{}' is not a valid URL: {}",
                self.gateway.base_url, e
            ))
        })?;

        Ok(())
    }
}

// =============================================================================
// Gateway Mode
// =============================================================================

/// Whether calls may reach the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Live when credential material is present, mocked otherwise
    #[default]
    Auto,
    /// Always attempt live calls
    Live,
    /// Never touch the network
    Mock,
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayMode::Auto => write!(f, "auto"),
            GatewayMode::Live => write!(f, "live"),
            GatewayMode::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(GatewayMode::Auto),
            "live" => Ok(GatewayMode::Live),
            "mock" => Ok(GatewayMode::Mock),
            _ => Err(format!(
                "Unknown gateway mode: {}. Valid values: auto, live, mock",
                s
            )),
        }
    }
}

/// Which transport serves providers without a dedicated one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Serverless proxy speaking the normalized wire contract
    #[default]
    Proxy,
    /// Direct Gemini generateContent calls
    Gemini,
}

// =============================================================================
// Gateway Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: GatewayMode,

    pub transport: TransportKind,

    /// Proxy endpoint
    pub base_url: String,

    /// Per-attempt deadline in milliseconds
    pub overall_timeout_ms: u64,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Auto,
            transport: TransportKind::Proxy,
            base_url: net_constants::DEFAULT_PROXY_URL.to_string(),
            overall_timeout_ms: net_constants::OVERALL_TIMEOUT_MS,
            connect_timeout_ms: net_constants::CONNECT_TIMEOUT_MS,
        }
    }
}

impl GatewayConfig {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per target after the first attempt
    pub retries: u32,
    pub base_delay_ms: u64,
    /// Exponential factor
    pub backoff: f64,
    /// Symmetric jitter fraction
    pub jitter: f64,
    pub min_delay_ms: u64,
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: retry_constants::DEFAULT_RETRIES,
            base_delay_ms: retry_constants::BASE_DELAY_MS,
            backoff: retry_constants::BACKOFF_FACTOR,
            jitter: retry_constants::JITTER,
            min_delay_ms: retry_constants::MIN_DELAY_MS,
            policy: RetryPolicy::Permissive,
        }
    }
}

// =============================================================================
// Circuit Breaker Configuration
// =============================================================================

/// Which calls share a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BreakerScope {
    /// One breaker for the whole process
    #[default]
    Global,
    /// One breaker per provider name
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub window_ms: u64,
    pub open_after: u32,
    pub half_open_after_ms: u64,
    pub close_after: u32,
    pub half_open_max_probes: u32,
    pub scope: BreakerScope,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_ms: cb_constants::WINDOW_MS,
            open_after: cb_constants::OPEN_AFTER,
            half_open_after_ms: cb_constants::HALF_OPEN_AFTER_MS,
            close_after: cb_constants::CLOSE_AFTER,
            half_open_max_probes: cb_constants::HALF_OPEN_MAX_PROBES,
            scope: BreakerScope::Global,
        }
    }
}

// =============================================================================
// Cooldown Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Zero disables the cooldown
    pub cooldown_ms: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: cooldown_constants::COOLDOWN_MS,
        }
    }
}

// =============================================================================
// Fallback Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Provider assumed for bare model names
    pub default_provider: String,

    /// Targets appended after the requested one (`model` or `provider:model`)
    pub defaults: Vec<String>,

    pub max_targets: usize,

    /// Regex patterns a requested model must match; empty allows any
    pub allowed_models: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_provider: fallback_constants::DEFAULT_PROVIDER.to_string(),
            defaults: vec![
                fallback_constants::PRIMARY_MODEL.to_string(),
                fallback_constants::SECONDARY_MODEL.to_string(),
            ],
            max_targets: fallback_constants::MAX_TARGETS,
            allowed_models: Vec::new(),
        }
    }
}

// =============================================================================
// Credentials Configuration
// =============================================================================

/// Credential discovery
///
/// The explicit key is never serialized and is redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variables checked in order
    pub env_vars: Vec<String>,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("env_vars", &self.env_vars)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_vars: mock_constants::CREDENTIAL_ENV_VARS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            api_key: None,
        }
    }
}

// =============================================================================
// Gemini Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_version: String,
    /// Variables the key is read from; other vendors' keys never qualify
    pub key_env_vars: Vec<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: net_constants::GEMINI_API_BASE.to_string(),
            api_version: net_constants::GEMINI_API_VERSION.to_string(),
            key_env_vars: net_constants::GEMINI_KEY_ENV_VARS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

// =============================================================================
// Telemetry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// =============================================================================
// Tests
// =============================================================================
