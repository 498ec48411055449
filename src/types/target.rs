use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{GatewayError, Result};

/// An upstream (provider, model) pair a call can be sent to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderTarget {
    pub provider: String,
    pub model: String,
}

impl ProviderTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse `provider:model`, or a bare `model` under `default_provider`
    pub fn parse(input: &str, default_provider: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (provider, model) = match trimmed.split_once(':') {
            Some((provider, model)) => (provider.trim(), model.trim()),
            None => (default_provider, trimmed),
        };

        if provider.is_empty() {
            return Err(GatewayError::InvalidTarget {
                input: input.to_string(),
                reason: "provider is empty".to_string(),
            });
        }
        if model.is_empty() {
            return Err(GatewayError::InvalidTarget {
                input: input.to_string(),
                reason: "model is empty".to_string(),
            });
        }

        Ok(Self::new(provider, model))
    }
}

impl fmt::Display for ProviderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_model_uses_default_provider() {
        let target = ProviderTarget::parse("gemini-2.5-flash", "gemini").unwrap();
        assert_eq!(target, ProviderTarget::new("gemini", "gemini-2.5-flash"));
    }

    #[test]
    fn test_parse_qualified_target() {
        let target = ProviderTarget::parse(" openai : gpt-4o ", "gemini").unwrap();
        assert_eq!(target.provider, "openai");
        assert_eq!(target.model, "gpt-4o");
        assert_eq!(target.to_string(), "openai:gpt-4o");
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(ProviderTarget::parse("", "gemini").is_err());
        assert!(ProviderTarget::parse("openai:", "gemini").is_err());
        assert!(ProviderTarget::parse(":model", "gemini").is_err());
    }
}
