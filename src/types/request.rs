//! Normalized call request
//!
//! A `CallRequest` is built once by the caller and only read by the gateway
//! and transports. Prompts and raw payloads are kept apart so the mock path
//! can echo exactly what the caller supplied.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;

use super::target::ProviderTarget;

/// Type-safe wrapper for call correlation IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random ID
    pub fn generate() -> Self {
        Self(format!("aipod-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-call options recognized by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    /// Per-attempt deadline override
    #[serde(with = "duration_ms_opt")]
    pub timeout: Option<Duration>,
    /// Requested model (`model` or `provider:model`)
    pub model: Option<String>,
    /// Explicit target list replacing the default sequence
    pub fallback_sequence: Vec<ProviderTarget>,
    /// Transport endpoint override
    pub base_url: Option<String>,
    /// Opaque tracking metadata, passed to telemetry only
    pub meta: Value,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_fallback(mut self, targets: Vec<ProviderTarget>) -> Self {
        self.fallback_sequence = targets;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Whether task start/end events should be emitted
    pub fn tracking(&self) -> bool {
        let flag = |key: &str| self.meta.get(key).and_then(Value::as_bool).unwrap_or(false);
        flag("track") && !flag("silent")
    }
}

/// Immutable AI call request
#[derive(Debug, Clone, Serialize)]
pub struct CallRequest {
    pub task: String,
    pub system: Option<String>,
    pub user: Option<String>,
    /// Raw payload sent instead of the prompts when present
    pub raw: Option<Value>,
    pub generation_config: Option<Value>,
    pub options: CallOptions,
    pub correlation_id: CorrelationId,
}

impl CallRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            system: None,
            user: None,
            raw: None,
            generation_config: None,
            options: CallOptions::default(),
            correlation_id: CorrelationId::generate(),
        }
    }

    /// Request built from a system and user prompt
    pub fn prompt(
        task: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::new(task).system(system).user(user)
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn raw(mut self, payload: Value) -> Self {
        self.raw = Some(payload);
        self
    }

    pub fn generation_config(mut self, config: Value) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    /// System and user prompts joined by a blank line, empty parts skipped
    pub fn prompt_text(&self) -> String {
        [self.system.as_deref(), self.user.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The payload as the caller supplied it
    pub fn echo_payload(&self) -> Value {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => json!({
                "task": self.task,
                "system": self.system,
                "user": self.user,
            }),
        }
    }
}

mod duration_ms_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
