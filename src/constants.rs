//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Retry scheduling constants
pub mod retry {
    /// Maximum retry attempts per target (attempts = retries + 1)
    pub const DEFAULT_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 300;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f64 = 2.0;

    /// Jitter fraction applied symmetrically around the computed delay
    pub const JITTER: f64 = 0.4;

    /// Floor for any computed delay (milliseconds)
    pub const MIN_DELAY_MS: u64 = 50;
}

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Sliding window for counting failures (milliseconds)
    pub const WINDOW_MS: u64 = 60_000;

    /// Number of failures inside the window before opening circuit
    pub const OPEN_AFTER: u32 = 5;

    /// Time spent fully open before probes are admitted (milliseconds)
    pub const HALF_OPEN_AFTER_MS: u64 = 30_000;

    /// Consecutive successes needed to close circuit from half-open
    pub const CLOSE_AFTER: u32 = 2;

    /// Outstanding probes allowed while half-open
    pub const HALF_OPEN_MAX_PROBES: u32 = 1;

    /// Registry key used when a single breaker covers every provider
    pub const GLOBAL_SCOPE: &str = "global";
}

/// Cooldown guard constants
pub mod cooldown {
    /// Global suppression window after a failed call (milliseconds)
    pub const COOLDOWN_MS: u64 = 15_000;
}

/// Fallback sequencing constants
pub mod fallback {
    /// Provider assumed for bare model names
    pub const DEFAULT_PROVIDER: &str = "gemini";

    /// Primary model when the caller does not request one
    pub const PRIMARY_MODEL: &str = "gemini-2.5-pro";

    /// Secondary model appended after the requested one
    pub const SECONDARY_MODEL: &str = "gemini-2.5-flash";

    /// Maximum distinct targets visited by one call
    pub const MAX_TARGETS: usize = 3;
}

/// HTTP/Network constants
pub mod network {
    /// Per-attempt deadline (milliseconds)
    pub const OVERALL_TIMEOUT_MS: u64 = 40_000;

    /// Connection establishment timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Default proxy endpoint (serverless function in local dev)
    pub const DEFAULT_PROXY_URL: &str = "http://localhost:8888/.netlify/functions/ai";

    /// Gemini generative language API
    pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

    /// Gemini API version segment
    pub const GEMINI_API_VERSION: &str = "v1beta";

    /// Variables the Gemini transport may read its key from
    pub const GEMINI_KEY_ENV_VARS: &[&str] = &[
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "GOOGLE_GENAI_KEY",
        "GOOGLE_GENERATIVE_LANGUAGE_API_KEY",
        "GENERATIVE_LANGUAGE_API_KEY",
    ];

    /// Source label sent in request metadata
    pub const META_SOURCE: &str = "gateway";
}

/// Degraded-mode constants
pub mod mock {
    /// Text returned by the mock path
    pub const MOCK_TEXT: &str = "[dev/mock] AI disabled or keys missing";

    /// Model label reported when the caller requested none
    pub const MOCK_MODEL: &str = "mock";

    /// Environment variables that count as credential material
    pub const CREDENTIAL_ENV_VARS: &[&str] = &[
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "GOOGLE_GENAI_KEY",
        "GOOGLE_GENERATIVE_LANGUAGE_API_KEY",
        "GENERATIVE_LANGUAGE_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
    ];
}

/// Telemetry event names
pub mod events {
    /// Terminal outcome of every call
    pub const USAGE: &str = "gateway.usage";

    /// Task start/end for tracked calls
    pub const TASK: &str = "gateway.task";

    /// Advancement to the next fallback target
    pub const FALLBACK: &str = "gateway.fallback";
}
