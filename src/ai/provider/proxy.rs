//! Serverless Proxy Transport
//!
//! Sends attempts to a proxy endpoint that holds the upstream keys:
//! `POST <base_url>?model=<model>&provider=<provider>` with a JSON body of
//! `{ prompt | contents, generationConfig?, meta }`.
//!
//! Success bodies may be flat (`text`, `data`, `output.text`) or carry raw
//! Gemini `candidates`; both are flattened into a `TransportReply`.
//!
//! The proxy answers 200 even when the upstream failed: a string `error`
//! such as `gemini_429` becomes a typed failure, and `mocked: true` marks a
//! reply from the proxy's own degraded path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProviderTransport, TransportReply, envelope, http_client};
use crate::config::Config;
use crate::constants::network as net_constants;
use crate::types::{
    CallError, CallRequest, CorrelationId, ErrorClassifier, GatewayError, ProviderTarget, Result,
};

/// Proxy transport speaking the normalized wire contract
pub struct ProxyTransport {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ProxyTransport {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: Self::validate_endpoint(base_url)?,
            client: http_client(connect_timeout)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.gateway.base_url, config.gateway.connect_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Only http/https endpoints are accepted
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            GatewayError::config(format!("Invalid proxy endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::config(format!(
                "Proxy endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn endpoint_for(
        &self,
        target: &ProviderTarget,
        request: &CallRequest,
    ) -> std::result::Result<url::Url, CallError> {
        let base = request
            .options
            .base_url
            .as_deref()
            .unwrap_or(&self.base_url);

        let mut url = url::Url::parse(base)
            .map_err(|e| CallError::unknown(format!("invalid endpoint '{}': {}", base, e)))?;
        url.query_pairs_mut()
            .append_pair("model", &target.model)
            .append_pair("provider", &target.provider);
        Ok(url)
    }

    fn build_body<'a>(request: &'a CallRequest) -> ProxyRequest<'a> {
        let (prompt, contents) = match &request.raw {
            Some(raw) => (None, Some(envelope::contents_from_raw(raw))),
            None => (Some(request.prompt_text()), None),
        };

        ProxyRequest {
            prompt,
            contents,
            generation_config: request.generation_config.as_ref(),
            meta: ProxyMeta {
                source: net_constants::META_SOURCE,
                ts: Utc::now(),
                task: &request.task,
                correlation_id: &request.correlation_id,
            },
        }
    }

    /// Flatten a 2xx body
    fn parse_reply(body: &str) -> std::result::Result<TransportReply, CallError> {
        let json: Value = serde_json::from_str(body)
            .map_err(|e| CallError::parse(format!("proxy returned invalid JSON: {}", e)))?;

        let Value::Object(map) = &json else {
            return Err(CallError::parse("proxy returned a non-object body"));
        };

        if map.get("ok").and_then(Value::as_bool) == Some(false) {
            return Err(match map.get("error") {
                Some(Value::String(error)) => Self::upstream_error(error),
                Some(other) => CallError::unknown(other.to_string()),
                None => CallError::unknown("proxy reported failure"),
            });
        }

        if let Some(error) = map
            .get("error")
            .and_then(Value::as_str)
            .filter(|error| !error.is_empty())
        {
            return Err(Self::upstream_error(error));
        }

        let data = match map.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => json.clone(),
        };

        let text = map
            .get("text")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| {
                json.pointer("/output/text")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .or_else(|| envelope::candidate_text(&data))
            .or_else(|| envelope::candidate_text(&json))
            .unwrap_or_default();

        let mocked = map.get("mocked").and_then(Value::as_bool) == Some(true);
        let reply = TransportReply::new(data, text).mocked(mocked);
        Ok(match map.get("model").and_then(Value::as_str) {
            Some(model) if !model.is_empty() => reply.with_model(model),
            _ => reply,
        })
    }

    /// `gemini_429` → `http_429`; anything without a trailing status → `unknown`
    fn upstream_error(error: &str) -> CallError {
        let status = error
            .rsplit(['_', ' ', ':'])
            .next()
            .and_then(|tail| tail.parse::<u16>().ok())
            .filter(|status| (100..=599).contains(status));

        match status {
            Some(status) => CallError::http(status, error),
            None => CallError::unknown(error),
        }
    }
}

#[async_trait]
impl ProviderTransport for ProxyTransport {
    async fn send(
        &self,
        target: &ProviderTarget,
        request: &CallRequest,
        deadline: Duration,
    ) -> std::result::Result<TransportReply, CallError> {
        let url = self.endpoint_for(target, request)?;
        let body = Self::build_body(request);

        debug!(
            endpoint = %url,
            provider = %target.provider,
            model = %target.model,
            "Sending request to proxy"
        );

        let response = self
            .client
            .post(url)
            .timeout(deadline)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_reqwest(&e, deadline))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::classify_reqwest(&e, deadline))?;

        if let Some(err) = ErrorClassifier::classify_status(status, &text) {
            warn!(status, model = %target.model, "Proxy returned error status");
            return Err(err);
        }

        Self::parse_reply(&text)
    }

    fn name(&self) -> &str {
        "proxy"
    }
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contents: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a Value>,
    meta: ProxyMeta<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyMeta<'a> {
    source: &'static str,
    ts: DateTime<Utc>,
    task: &'a str,
    correlation_id: &'a CorrelationId,
}
