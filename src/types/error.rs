//! Unified Error Type System
//!
//! Two layers of errors live here:
//!
//! - [`CallError`]: the typed outcome of one gateway call or transport attempt.
//!   It never escapes as a Rust error from `Gateway::call`; it is carried
//!   inside `CallResult` so callers observe one response shape.
//! - [`GatewayError`]: fallible setup (configuration, HTTP client
//!   construction, IO) and the CLI boundary.
//!
//! ## Error Kinds
//!
//! - **network_timeout**: deadline expired or the request was aborted
//! - **http_<status>**: upstream answered with a non-2xx status
//! - **parse_error**: a 2xx body could not be understood
//! - **transport_unavailable**: no transport can serve the target
//! - **circuit_open**: the breaker rejected the call before any network I/O
//! - **cooldown_active**: the global cooldown rejected the call
//! - **unknown**: any other transport failure

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::target::ProviderTarget;

// =============================================================================
// Error Kind
// =============================================================================

/// Typed failure taxonomy, rendered as stable snake_case codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NetworkTimeout,
    Http(u16),
    ParseError,
    TransportUnavailable,
    CircuitOpen,
    CooldownActive,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkTimeout => write!(f, "network_timeout"),
            Self::Http(status) => write!(f, "http_{}", status),
            Self::ParseError => write!(f, "parse_error"),
            Self::TransportUnavailable => write!(f, "transport_unavailable"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::CooldownActive => write!(f, "cooldown_active"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "network_timeout" => Ok(Self::NetworkTimeout),
            "parse_error" => Ok(Self::ParseError),
            "transport_unavailable" => Ok(Self::TransportUnavailable),
            "circuit_open" => Ok(Self::CircuitOpen),
            "cooldown_active" => Ok(Self::CooldownActive),
            "unknown" => Ok(Self::Unknown),
            other => other
                .strip_prefix("http_")
                .and_then(|code| code.parse::<u16>().ok())
                .map(Self::Http)
                .ok_or_else(|| format!("Unknown error code: {}", other)),
        }
    }
}

impl ErrorKind {
    /// Whether this kind is produced before any network I/O
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::CooldownActive)
    }

    /// HTTP status, if this kind carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Call Error
// =============================================================================

/// Typed failure of a call or attempt, with the target that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
    pub target: Option<ProviderTarget>,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, self.message.is_empty()) {
            (Some(target), false) => write!(f, "[{}:{}] {}", target, self.kind, self.message),
            (Some(target), true) => write!(f, "[{}:{}]", target, self.kind),
            (None, false) => write!(f, "[{}] {}", self.kind, self.message),
            (None, true) => write!(f, "[{}]", self.kind),
        }
    }
}

impl std::error::Error for CallError {}

impl Serialize for CallError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&self.kind)
    }
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            target: None,
        }
    }

    /// Attach the target that produced the error
    pub fn with_target(mut self, target: ProviderTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn network_timeout(deadline: Duration) -> Self {
        Self::new(
            ErrorKind::NetworkTimeout,
            format!("deadline of {}ms expired", deadline.as_millis()),
        )
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::new(ErrorKind::Http(status), body)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn transport_unavailable(provider: &str) -> Self {
        Self::new(
            ErrorKind::TransportUnavailable,
            format!("no transport configured for provider '{}'", provider),
        )
    }

    pub fn circuit_open() -> Self {
        Self::new(ErrorKind::CircuitOpen, "circuit breaker is open")
    }

    pub fn cooldown_active(remaining: Duration) -> Self {
        Self::new(
            ErrorKind::CooldownActive,
            format!("cooldown active for another {}ms", remaining.as_millis()),
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Stable code, e.g. `http_429`
    pub fn code(&self) -> String {
        self.kind.to_string()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps transport-level failures onto [`ErrorKind`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a reqwest failure raised before a status was available
    pub fn classify_reqwest(err: &reqwest::Error, deadline: Duration) -> CallError {
        if err.is_timeout() {
            return CallError::network_timeout(deadline);
        }
        if err.is_decode() {
            return CallError::parse(err.to_string());
        }
        if let Some(status) = err.status() {
            return CallError::http(status.as_u16(), err.to_string());
        }
        CallError::unknown(err.to_string())
    }

    /// Classify a completed HTTP response status; `None` for 2xx
    pub fn classify_status(status: u16, body: &str) -> Option<CallError> {
        if (200..300).contains(&status) {
            return None;
        }
        let mut message = body.trim().to_string();
        if message.len() > 512 {
            let mut cut = 512;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Some(CallError::http(status, message))
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Which attempt failures are retried against the same target.
///
/// `Permissive` retries any upstream failure, 4xx included. `Strict` only
/// retries failures that can plausibly clear on their own and advances to the
/// next target on other client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    #[default]
    Permissive,
    Strict,
}

impl RetryPolicy {
    pub fn is_retryable(&self, err: &CallError) -> bool {
        match err.kind {
            ErrorKind::TransportUnavailable
            | ErrorKind::CircuitOpen
            | ErrorKind::CooldownActive => false,
            ErrorKind::NetworkTimeout | ErrorKind::ParseError | ErrorKind::Unknown => true,
            ErrorKind::Http(status) => match self {
                Self::Permissive => true,
                Self::Strict => status == 408 || status == 429 || status >= 500,
            },
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permissive => write!(f, "permissive"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("Call failed: {0}")]
    Call(#[from] CallError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

// =============================================================================
// Tests
// =============================================================================
