//! Live/mock decision
//!
//! Decides, before anything else runs, whether a call may reach the network.
//! In `auto` mode a call goes live only when credential material exists:
//! an explicitly configured key or any of the configured environment
//! variables holding a non-empty value.

use crate::config::{CredentialsConfig, GatewayMode};

#[derive(Debug, Clone)]
pub struct Liveness {
    mode: GatewayMode,
    has_credentials: bool,
}

impl Liveness {
    pub fn new(mode: GatewayMode, has_credentials: bool) -> Self {
        Self {
            mode,
            has_credentials,
        }
    }

    /// Resolve against the process environment
    pub fn detect(mode: GatewayMode, credentials: &CredentialsConfig) -> Self {
        Self::detect_with(mode, credentials, |name| std::env::var(name).ok())
    }

    /// Resolve with a custom variable lookup
    pub fn detect_with<F>(mode: GatewayMode, credentials: &CredentialsConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = credentials
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());

        let from_env = || {
            credentials
                .env_vars
                .iter()
                .any(|name| lookup(name).is_some_and(|value| !value.trim().is_empty()))
        };

        Self::new(mode, explicit || from_env())
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    pub fn has_credentials(&self) -> bool {
        self.has_credentials
    }

    /// Whether calls take the degraded path
    pub fn should_mock(&self) -> bool {
        match self.mode {
            GatewayMode::Mock => true,
            GatewayMode::Live => false,
            GatewayMode::Auto => !self.has_credentials,
        }
    }
}
