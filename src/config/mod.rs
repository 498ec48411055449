//! Configuration Management
//!
//! Hierarchical resolution, later sources win:
//! 1. Built-in defaults
//! 2. Global config (<config dir>/aipod-gateway/config.toml)
//! 3. Project config (.aipod/config.toml)
//! 4. Environment variables (AIPOD_*)
//! 5. CLI arguments

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
