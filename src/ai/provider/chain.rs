//! Fallback Target Sequencing
//!
//! Orders the (provider, model) targets one call may visit.
//!
//! ## Strategy
//!
//! 1. An explicit `fallback_sequence` in the call options wins outright
//! 2. Otherwise the requested model comes first, followed by the defaults
//! 3. Duplicates are dropped, keeping the first occurrence
//! 4. The list is capped at `max_targets`
//!
//! When an allowlist is configured, a requested model matching none of its
//! patterns is replaced by the primary default before sequencing.

use regex::Regex;
use tracing::warn;

use crate::config::FallbackConfig;
use crate::types::{CallOptions, GatewayError, ProviderTarget, Result};

/// Ordered, duplicate-free list of targets for one call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FallbackSequence {
    targets: Vec<ProviderTarget>,
}

impl FallbackSequence {
    /// Requested target first, then defaults
    pub fn build(
        requested: Option<ProviderTarget>,
        defaults: &[ProviderTarget],
        max_targets: usize,
    ) -> Self {
        let candidates = requested.into_iter().chain(defaults.iter().cloned());
        Self::dedup_capped(candidates, max_targets)
    }

    /// Explicit override, deduplicated and capped
    pub fn from_explicit(targets: Vec<ProviderTarget>, max_targets: usize) -> Self {
        Self::dedup_capped(targets, max_targets)
    }

    fn dedup_capped(
        candidates: impl IntoIterator<Item = ProviderTarget>,
        max_targets: usize,
    ) -> Self {
        let mut targets: Vec<ProviderTarget> = Vec::with_capacity(max_targets);
        for target in candidates {
            if targets.len() >= max_targets {
                break;
            }
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Self { targets }
    }

    pub fn target_at(&self, index: usize) -> Option<&ProviderTarget> {
        self.targets.get(index)
    }

    pub fn primary(&self) -> Option<&ProviderTarget> {
        self.targets.first()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProviderTarget> {
        self.targets.iter()
    }

    pub fn targets(&self) -> &[ProviderTarget] {
        &self.targets
    }
}

impl<'a> IntoIterator for &'a FallbackSequence {
    type Item = &'a ProviderTarget;
    type IntoIter = std::slice::Iter<'a, ProviderTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Builds a `FallbackSequence` per call from configuration
#[derive(Debug, Clone)]
pub struct FallbackPlanner {
    default_provider: String,
    defaults: Vec<ProviderTarget>,
    max_targets: usize,
    allowed_models: Vec<Regex>,
}

impl FallbackPlanner {
    pub fn from_config(config: &FallbackConfig) -> Result<Self> {
        let defaults = config
            .defaults
            .iter()
            .map(|entry| ProviderTarget::parse(entry, &config.default_provider))
            .collect::<Result<Vec<_>>>()?;

        let allowed_models = config
            .allowed_models
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    GatewayError::config(format!("Invalid model pattern '{}': {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            default_provider: config.default_provider.clone(),
            defaults,
            max_targets: config.max_targets,
            allowed_models,
        })
    }

    pub fn defaults(&self) -> &[ProviderTarget] {
        &self.defaults
    }

    /// Whether `model` passes the allowlist (always true when none is set)
    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|re| re.is_match(model))
    }

    /// Resolve the requested target, applying the allowlist
    pub fn requested_target(&self, options: &CallOptions) -> Option<ProviderTarget> {
        let raw = options.model.as_deref().filter(|m| !m.trim().is_empty())?;

        let target = match ProviderTarget::parse(raw, &self.default_provider) {
            Ok(target) => target,
            Err(e) => {
                warn!(requested = raw, error = %e, "Ignoring invalid requested model");
                return None;
            }
        };

        if self.is_allowed(&target.model) {
            return Some(target);
        }

        let replacement = self.defaults.first().cloned();
        warn!(
            requested = %target,
            replacement = ?replacement.as_ref().map(ToString::to_string),
            "Requested model not allowed, using primary default"
        );
        replacement
    }

    /// Sequence for one call
    pub fn plan(&self, options: &CallOptions) -> FallbackSequence {
        if !options.fallback_sequence.is_empty() {
            return FallbackSequence::from_explicit(
                options.fallback_sequence.clone(),
                self.max_targets,
            );
        }
        FallbackSequence::build(
            self.requested_target(options),
            &self.defaults,
            self.max_targets,
        )
    }
}
