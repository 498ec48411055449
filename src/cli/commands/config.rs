//! Config Command
//!
//! Manage gateway configuration.
//!
//! Usage:
//!   aipod-gateway config show [--json]
//!   aipod-gateway config path
//!   aipod-gateway config init [-g] [--force]

use crate::ai::Liveness;
use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the effective configuration (merged from all sources)
pub fn show(as_json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    print!("{}", ConfigLoader::render(&config, as_json)?);
    if as_json {
        println!();
    }
    Ok(())
}

/// Show configuration paths and the resulting call posture
pub fn path() -> Result<()> {
    let out = Output::new();

    out.section("Configuration Files");
    match ConfigLoader::global_config_path() {
        Some(global) => {
            let exists = global.exists();
            out.path("global", &global, exists);
        }
        None => out.field("global", "unavailable"),
    }
    let project = ConfigLoader::project_config_path();
    out.path("project", &project, project.exists());
    out.field("env", "AIPOD_<SECTION>__<KEY>");

    let config = ConfigLoader::load()?;
    let liveness = Liveness::detect(config.gateway.mode, &config.credentials);

    out.section("Posture");
    out.field("mode", config.gateway.mode);
    out.field(
        "calls",
        if liveness.should_mock() { "mocked" } else { "live" },
    );
    out.field("fallback", config.fallback.defaults.join(" → "));
    Ok(())
}

/// Write a default config file
pub fn init(global: bool, force: bool) -> Result<()> {
    let out = Output::new();

    let existing = if global {
        ConfigLoader::global_config_path()
    } else {
        Some(ConfigLoader::project_config_path())
    };
    if let Some(path) = existing.filter(|p| p.exists() && !force) {
        out.warning(&format!(
            "Config already exists: {} (use --force to overwrite)",
            path.display()
        ));
        return Ok(());
    }

    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };
    out.success(&format!("Initialized configuration: {}", path.display()));
    Ok(())
}
