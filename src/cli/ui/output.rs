use console::style;

use crate::ai::CircuitState;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Aligned `label: value` line
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<12} {}", style(format!("{}:", label)).dim(), value);
    }

    pub fn path(&self, label: &str, path: &std::path::Path, exists: bool) {
        let marker = if exists {
            style("exists").green()
        } else {
            style("missing").dim()
        };
        println!("  {:<12} {} ({})", style(format!("{}:", label)).dim(), path.display(), marker);
    }

    pub fn circuit(&self, scope: &str, state: CircuitState) {
        let state = match state {
            CircuitState::Closed => style(state.to_string()).green(),
            CircuitState::HalfOpen => style(state.to_string()).yellow(),
            CircuitState::Open => style(state.to_string()).red(),
        };
        println!("  {:<12} {}", style(format!("{}:", scope)).dim(), state);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
