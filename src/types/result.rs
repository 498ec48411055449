use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::error::{CallError, GatewayError, Result};
use super::request::CorrelationId;
use super::target::ProviderTarget;
use crate::constants::mock as mock_constants;

/// The only shape a caller observes.
///
/// `error` is present iff `ok` is false. Use the constructors rather than
/// building the struct by hand.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub ok: bool,
    pub data: Option<Value>,
    pub text: Option<String>,
    pub model: Option<String>,
    pub mocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
    pub correlation_id: CorrelationId,
}

impl CallResult {
    pub fn success(
        data: Value,
        text: String,
        model: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            ok: true,
            data: Some(data),
            text: Some(text),
            model: Some(model.into()),
            mocked: false,
            error: None,
            correlation_id,
        }
    }

    pub fn failure(error: CallError, correlation_id: CorrelationId) -> Self {
        let model = error.target.as_ref().map(|t| t.model.clone());
        Self {
            ok: false,
            data: None,
            text: None,
            model,
            mocked: false,
            error: Some(error),
            correlation_id,
        }
    }

    /// Degraded result echoing the caller's payload
    pub fn mocked(model: Option<String>, echo: Value, correlation_id: CorrelationId) -> Self {
        Self {
            ok: true,
            data: Some(json!({
                "text": mock_constants::MOCK_TEXT,
                "echo": echo,
            })),
            text: Some(mock_constants::MOCK_TEXT.to_string()),
            model: Some(model.unwrap_or_else(|| mock_constants::MOCK_MODEL.to_string())),
            mocked: true,
            error: None,
            correlation_id,
        }
    }

    /// Error code, if the call failed
    pub fn error_code(&self) -> Option<String> {
        self.error.as_ref().map(CallError::code)
    }

    /// Convert a failed result into a `GatewayError::Call`
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(err) if !self.ok => Err(GatewayError::Call(err)),
            error => {
                self.error = error;
                Ok(self)
            }
        }
    }
}

/// One transport attempt made during a call
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub target: ProviderTarget,
    /// 0-based attempt index against this target
    pub index: u32,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result plus the attempts that produced it
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub result: CallResult,
    pub attempts: Vec<AttemptRecord>,
}

impl CallOutcome {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Distinct targets in the order they were first attempted
    pub fn visited_targets(&self) -> Vec<ProviderTarget> {
        let mut visited: Vec<ProviderTarget> = Vec::new();
        for attempt in &self.attempts {
            if !visited.contains(&attempt.target) {
                visited.push(attempt.target.clone());
            }
        }
        visited
    }
}

fn serialize_ms<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}
