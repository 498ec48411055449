//! Telemetry Sinks
//!
//! The gateway reports usage and task progress through [`TelemetrySink`].
//! `emit` returns nothing: a sink that cannot deliver an event drops it.
//! The gateway contains a panicking sink, logs it and carries on with the
//! call, so the event is lost but the result is not.
//!
//! ## Events
//!
//! - `gateway.usage`: every terminal outcome (success, failure, mock)
//! - `gateway.task`: start/end of calls whose `meta.track` is set
//! - `gateway.fallback`: advancement to the next target

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::{CallError, CorrelationId};

/// Fire-and-forget event receiver
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &str, detail: Value);
}

pub type SharedTelemetry = Arc<dyn TelemetrySink>;

// =============================================================================
// Sinks
// =============================================================================

/// Logs every event through `tracing` under target `aipod::telemetry`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: &str, detail: Value) {
        tracing::info!(target: "aipod::telemetry", event, %detail);
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: &str, _detail: Value) {}
}

/// Keeps every event in memory, unbounded
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: std::sync::Mutex<Vec<(String, Value)>>,
}

#[cfg(test)]
impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Details of every event with the given name, in emission order
    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, detail)| detail)
            .collect()
    }
}

#[cfg(test)]
impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: &str, detail: Value) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((event.to_string(), detail));
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

/// Detail of a `gateway.usage` event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent<'a> {
    pub task: &'a str,
    pub model_used: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub ok: bool,
    pub mocked: bool,
    pub attempts: usize,
    pub ts: DateTime<Utc>,
    pub correlation_id: &'a CorrelationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_null_meta")]
    pub meta: &'a Value,
}

impl UsageEvent<'_> {
    pub fn with_error(mut self, error: Option<&CallError>) -> Self {
        self.error = error.map(ToString::to_string);
        self
    }
}

/// Phase of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Start,
    End,
}

/// Detail of a `gateway.task` event
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent<'a> {
    pub id: &'a CorrelationId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
}

impl<'a> TaskEvent<'a> {
    pub fn new(id: &'a CorrelationId, state: TaskState, meta: &'a Value) -> Self {
        Self {
            id,
            state,
            scope: meta.get("scope").and_then(Value::as_str),
            label: meta.get("label").and_then(Value::as_str),
            ok: None,
        }
    }
}

fn is_null_meta(meta: &&Value) -> bool {
    meta.is_null()
}

/// Serialize an event payload; unserializable payloads degrade to null
pub fn detail_of<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}
