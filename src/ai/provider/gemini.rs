//! Gemini API Transport
//!
//! Direct `generateContent` calls against the Generative Language API.
//! The key travels in the `x-goog-api-key` header and is never logged.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProviderTransport, TransportReply, envelope, http_client};
use crate::config::Config;
use crate::types::{
    CallError, CallRequest, ErrorClassifier, GatewayError, ProviderTarget, Result,
};

/// Provider name this transport answers for
const PROVIDER: &str = "gemini";

/// Gemini transport with secure API key handling
pub struct GeminiTransport {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    api_version: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTransport")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl GeminiTransport {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut api_base = api_base.into();
        while api_base.ends_with('/') {
            api_base.pop();
        }

        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            api_base,
            api_version: api_version.into(),
            client: http_client(connect_timeout)?,
        })
    }

    /// Key from config, else the first non-empty Gemini key variable
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = Self::resolve_key(config, |name| std::env::var(name).ok())?;

        Self::new(
            api_key,
            config.gemini.api_base.clone(),
            config.gemini.api_version.clone(),
            config.gateway.connect_timeout(),
        )
    }

    fn resolve_key<F>(config: &Config, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        config
            .credentials
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                config
                    .gemini
                    .key_env_vars
                    .iter()
                    .filter_map(|name| lookup(name))
                    .find(|value| !value.trim().is_empty())
            })
            .ok_or_else(|| {
                GatewayError::config(format!(
                    "Gemini API key not found. Set one of {} or credentials.api_key",
                    config.gemini.key_env_vars.join(", ")
                ))
            })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.api_base, self.api_version, model
        )
    }

    fn build_request<'a>(request: &'a CallRequest) -> GenerateContentRequest<'a> {
        // Raw payloads carry their own instructions
        let system_instruction = match (&request.raw, request.system.as_deref()) {
            (None, Some(system)) if !system.is_empty() => {
                Some(json!({ "parts": [{ "text": system }] }))
            }
            _ => None,
        };

        let contents = match &request.raw {
            Some(raw) => envelope::contents_from_raw(raw),
            None => envelope::user_turn(request.user.as_deref().unwrap_or_default()),
        };

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: request.generation_config.as_ref(),
        }
    }
}

#[async_trait]
impl ProviderTransport for GeminiTransport {
    async fn send(
        &self,
        target: &ProviderTarget,
        request: &CallRequest,
        deadline: Duration,
    ) -> std::result::Result<TransportReply, CallError> {
        if !self.serves(&target.provider) {
            return Err(CallError::transport_unavailable(&target.provider));
        }
        let url = self.endpoint(&target.model);
        debug!(model = %target.model, "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .timeout(deadline)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_reqwest(&e, deadline))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::classify_reqwest(&e, deadline))?;

        if let Some(err) = ErrorClassifier::classify_status(status, &body) {
            warn!(status, model = %target.model, "Gemini API returned error status");
            return Err(err);
        }

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| CallError::parse(format!("Failed to parse Gemini response: {}", e)))?;

        let text = envelope::candidate_text(&data)
            .ok_or_else(|| CallError::parse("No candidates in Gemini response"))?;

        let reply = TransportReply::new(data.clone(), text);
        Ok(match data.get("modelVersion").and_then(Value::as_str) {
            Some(version) => reply.with_model(version),
            None => reply,
        })
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn serves(&self, provider: &str) -> bool {
        provider == PROVIDER
    }
}

// Request types

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> GeminiTransport {
        GeminiTransport::new("test-key", server.uri(), "v1beta", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_debug_redacts_key() {
        let transport = GeminiTransport::new(
            "super-secret",
            "https://example.com/",
            "v1beta",
            Duration::from_secs(1),
        )
        .unwrap();
        let debug = format!("{:?}", transport);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
        assert_eq!(
            transport.endpoint("gemini-2.5-pro"),
            "https://example.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn test_key_lookup_ignores_other_vendors() {
        let config = Config::default();
        let only_openai = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-openai".to_string());
        assert!(GeminiTransport::resolve_key(&config, only_openai).is_err());

        let google = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            "GOOGLE_API_KEY" => Some("g-key".to_string()),
            _ => None,
        };
        assert_eq!(GeminiTransport::resolve_key(&config, google).unwrap(), "g-key");

        let mut explicit = Config::default();
        explicit.credentials.api_key = Some("configured".to_string());
        assert_eq!(
            GeminiTransport::resolve_key(&explicit, |_| None).unwrap(),
            "configured"
        );
    }

    #[test]
    fn test_build_request_splits_system() {
        let request = CallRequest::prompt("t", "Be terse.", "Hello");
        let body = serde_json::to_value(GeminiTransport::build_request(&request)).unwrap();
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Be terse.");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert!(body.get("generation_config").is_none());
    }

    #[tokio::test]
    async fn test_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({"generation_config": {"temperature": 0.1}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "first"}, {"text": "second"}]}}],
                "modelVersion": "gemini-2.5-flash-002"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request =
            CallRequest::prompt("t", "s", "u").generation_config(json!({"temperature": 0.1}));
        let reply = transport(&server)
            .send(
                &ProviderTarget::new("gemini", "gemini-2.5-flash"),
                &request,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(reply.text, "first\n\nsecond");
        assert_eq!(reply.model.as_deref(), Some("gemini-2.5-flash-002"));
    }

    #[tokio::test]
    async fn test_other_provider_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let transport = transport(&server);
        assert!(transport.serves("gemini"));
        assert!(!transport.serves("openai"));

        let err = transport
            .send(
                &ProviderTarget::new("openai", "gpt-4o"),
                &CallRequest::new("t"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportUnavailable);
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(
                &ProviderTarget::new("gemini", "gemini-2.5-pro"),
                &CallRequest::new("t"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Http(429));
    }

    #[tokio::test]
    async fn test_missing_candidates_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"promptFeedback": {}})))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send(
                &ProviderTarget::new("gemini", "gemini-2.5-pro"),
                &CallRequest::new("t"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }
}
