//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (<config dir>/aipod-gateway/config.toml)
//! 3. Project config (.aipod/config.toml)
//! 4. Environment variables (AIPOD_* prefix, `__` separates sections)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{GatewayError, Result};

const ENV_PREFIX: &str = "AIPOD_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. AIPOD_BREAKER__OPEN_AFTER -> breaker.open_after
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(figment)
    }

    /// Load configuration from a specific file only (plus defaults)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| GatewayError::config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "aipod-gateway").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(".aipod")
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render the effective configuration as TOML or JSON
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| GatewayError::config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write the default global config; returns the file path
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            GatewayError::config("Cannot determine global config directory")
        })?;
        Self::write_default(&global_dir, force)
    }

    /// Write the default project config; returns the file path
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::write_default(&Self::project_dir(), force)
    }

    fn write_default(dir: &Path, force: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_toml())?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    fn default_config_toml() -> String {
        r#"# AI POD Gateway Configuration
# Environment variables (AIPOD_<SECTION>__<KEY>) override these values.

version = "1.0"

[gateway]
# auto: live only when credentials are present; live; mock
mode = "auto"
transport = "proxy"
base_url = "http://localhost:8888/.netlify/functions/ai"
overall_timeout_ms = 40000
connect_timeout_ms = 5000

[retry]
retries = 3
base_delay_ms = 300
backoff = 2.0
jitter = 0.4
min_delay_ms = 50
# permissive retries every upstream failure; strict skips non-transient 4xx
policy = "permissive"

[breaker]
window_ms = 60000
open_after = 5
half_open_after_ms = 30000
close_after = 2
half_open_max_probes = 1
scope = "global"

[cooldown]
cooldown_ms = 15000

[fallback]
default_provider = "gemini"
defaults = ["gemini-2.5-pro", "gemini-2.5-flash"]
max_targets = 3
allowed_models = []
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerScope, GatewayMode};
    use crate::types::RetryPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, ConfigLoader::default_config_toml()).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.retry.retries, defaults.retry.retries);
        assert_eq!(config.breaker.open_after, defaults.breaker.open_after);
        assert_eq!(config.gateway.base_url, defaults.gateway.base_url);
        assert_eq!(config.fallback.defaults, defaults.fallback.defaults);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[gateway]
mode = "mock"

[retry]
retries = 1
policy = "strict"

[breaker]
scope = "provider"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.gateway.mode, GatewayMode::Mock);
        assert_eq!(config.retry.retries, 1);
        assert_eq!(config.retry.policy, RetryPolicy::Strict);
        assert_eq!(config.breaker.scope, BreakerScope::Provider);
        // Untouched sections keep defaults
        assert_eq!(config.cooldown.cooldown_ms, 15_000);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[retry]\njitter = 2.5\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_write_default_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested");

        let path = ConfigLoader::write_default(&dir, false).unwrap();
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::write_default(&dir, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"custom\"\n");

        ConfigLoader::write_default(&dir, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[breaker]"));
    }

    #[test]
    fn test_env_override() {
        // SAFETY: no other test reads this variable
        unsafe {
            std::env::set_var("AIPOD_COOLDOWN__COOLDOWN_MS", "1234");
        }
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.cooldown.cooldown_ms, 1234);
        unsafe {
            std::env::remove_var("AIPOD_COOLDOWN__COOLDOWN_MS");
        }
    }

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        let toml_out = ConfigLoader::render(&config, false).unwrap();
        assert!(toml_out.contains("[breaker]"));

        let json_out = ConfigLoader::render(&config, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json_out).unwrap();
        assert_eq!(value["breaker"]["open_after"], 5);
        assert!(value["credentials"].get("api_key").is_none());
    }
}
