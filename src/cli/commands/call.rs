//! Call Command
//!
//! Send one AI call through the gateway and print the result as JSON.
//!
//! Usage:
//!   aipod-gateway call --task intel --system "..." --user "..."
//!   aipod-gateway call --task intel --raw '{"contents": [...]}' --fallback gemini-2.5-flash
//!   aipod-gateway call --task intel --user "..." --mode mock --attempts --stats

use std::time::Duration;

use serde_json::Value;

use crate::ai::Gateway;
use crate::cli::ui::Output;
use crate::config::{ConfigLoader, GatewayMode};
use crate::types::{CallOptions, CallRequest, ProviderTarget, Result};

/// Options accepted by `aipod-gateway call`
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub task: String,
    pub system: Option<String>,
    pub user: Option<String>,
    /// Raw JSON payload replacing the prompts
    pub raw: Option<String>,
    /// JSON generation config forwarded upstream
    pub generation_config: Option<String>,
    pub model: Option<String>,
    pub fallback: Vec<String>,
    pub timeout_ms: Option<u64>,
    pub base_url: Option<String>,
    pub mode: Option<GatewayMode>,
    /// Print attempt records alongside the result
    pub attempts: bool,
    /// Print breaker and metrics summary after the result
    pub stats: bool,
}

/// Run one call; returns whether it succeeded
pub async fn run(args: CallArgs) -> Result<bool> {
    let mut config = ConfigLoader::load()?;
    if let Some(mode) = args.mode {
        config.gateway.mode = mode;
    }

    let request = build_request(&args, &config.fallback.default_provider)?;
    let gateway = Gateway::from_config(config)?;
    let outcome = gateway.call_with_attempts(request).await;

    let json = if args.attempts {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string_pretty(&outcome.result)?
    };
    println!("{}", json);

    if args.stats {
        print_stats(&gateway);
    }

    Ok(outcome.result.ok)
}

fn build_request(args: &CallArgs, default_provider: &str) -> Result<CallRequest> {
    let fallback = args
        .fallback
        .iter()
        .map(|entry| ProviderTarget::parse(entry, default_provider))
        .collect::<Result<Vec<_>>>()?;

    let mut options = CallOptions::default().with_fallback(fallback);
    if let Some(model) = &args.model {
        options = options.with_model(model);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        options = options.with_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(base_url) = &args.base_url {
        options = options.with_base_url(base_url);
    }

    let mut request = CallRequest::new(&args.task).options(options);
    if let Some(system) = &args.system {
        request = request.system(system);
    }
    if let Some(user) = &args.user {
        request = request.user(user);
    }
    if let Some(raw) = &args.raw {
        request = request.raw(serde_json::from_str::<Value>(raw)?);
    }
    if let Some(generation_config) = &args.generation_config {
        request = request.generation_config(serde_json::from_str::<Value>(generation_config)?);
    }

    Ok(request)
}

fn print_stats(gateway: &Gateway) {
    let out = Output::new();

    out.section("Circuit Breakers");
    let stats = gateway.breaker_stats();
    if stats.is_empty() {
        out.field("none", "no breaker consulted");
    }
    for breaker in &stats {
        out.circuit(&breaker.scope, breaker.state);
        out.field("window", breaker.window_failures);
    }

    out.section("Metrics");
    for line in gateway.metrics().display().lines() {
        println!("  {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CallArgs {
        CallArgs {
            task: "intel".to_string(),
            system: Some("Be terse.".to_string()),
            user: Some("Three headlines".to_string()),
            ..CallArgs::default()
        }
    }

    #[test]
    fn test_build_request_from_flags() {
        let args = CallArgs {
            model: Some("gemini-2.5-flash".to_string()),
            fallback: vec!["gemini-2.5-pro".to_string(), "openai:gpt-4o".to_string()],
            timeout_ms: Some(2_000),
            generation_config: Some(r#"{"temperature": 0.2}"#.to_string()),
            ..args()
        };
        let request = build_request(&args, "gemini").unwrap();

        assert_eq!(request.prompt_text(), "Be terse.\n\nThree headlines");
        assert_eq!(request.options.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(
            request.options.fallback_sequence,
            vec![
                ProviderTarget::new("gemini", "gemini-2.5-pro"),
                ProviderTarget::new("openai", "gpt-4o"),
            ]
        );
        assert_eq!(request.options.timeout, Some(Duration::from_secs(2)));
        assert_eq!(request.generation_config.unwrap()["temperature"], 0.2);
    }

    #[test]
    fn test_build_request_rejects_bad_input() {
        let bad_target = CallArgs {
            fallback: vec!["openai:".to_string()],
            ..args()
        };
        assert!(build_request(&bad_target, "gemini").is_err());

        let bad_raw = CallArgs {
            raw: Some("{not json".to_string()),
            ..args()
        };
        assert!(build_request(&bad_raw, "gemini").is_err());
    }

    #[tokio::test]
    async fn test_mock_call_through_gateway() {
        let request = build_request(&args(), "gemini").unwrap();
        let gateway = Gateway::builder(crate::config::Config::default())
            .mode(GatewayMode::Mock)
            .build()
            .unwrap();

        let result = gateway.call(request).await;
        assert!(result.ok);
        assert!(result.mocked);
    }
}
