//! Layered configuration
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file,
//! `.env`, then environment variables such as
//! `CONTEXT_PRUNER_SCORING__DECAY_FACTOR=0.9`.

use crate::context::models::SummaryLevel;
use crate::error::{ContextError, Result};
use crate::pruning::{PruningStrategy, DEFAULT_UNDO_CAPACITY};
use crate::scoring::{ImportanceConfig, ScoringProfile};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CONTEXT_PRUNER";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Importance scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Built-in profile name, ignored when `custom_profile` is set
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Per-minute recency decay
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Neighbours on each side for window-based scores
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default)]
    pub custom_profile: Option<ScoringProfile>,
}

/// Pruning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Built-in strategy used when the caller names none
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,

    /// Summary granularity for pruned segments
    #[serde(default = "default_summary_level")]
    pub summary_level: SummaryLevel,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_profile() -> String { "default".to_string() }
fn default_decay_factor() -> f64 { 0.95 }
fn default_context_window() -> usize { 5 }
fn default_strategy() -> String { "balanced".to_string() }
fn default_undo_capacity() -> usize { DEFAULT_UNDO_CAPACITY }
fn default_summary_level() -> SummaryLevel { SummaryLevel::Session }
fn default_log_level() -> String { "info".to_string() }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            decay_factor: default_decay_factor(),
            context_window: default_context_window(),
            custom_profile: None,
        }
    }
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            undo_capacity: default_undo_capacity(),
            summary_level: default_summary_level(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, `.env` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that named presets exist and numeric settings are in range
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.scoring.decay_factor) {
            return Err(ContextError::Configuration(format!(
                "scoring.decay_factor must be within [0, 1], got {}",
                self.scoring.decay_factor
            )));
        }
        self.scoring_profile()?;
        self.strategy()?.validate()?;
        Ok(())
    }

    /// Active scoring profile: the custom one if given, else the named preset
    pub fn scoring_profile(&self) -> Result<ScoringProfile> {
        match &self.scoring.custom_profile {
            Some(profile) => Ok(profile.clone()),
            None => ScoringProfile::by_name(&self.scoring.profile),
        }
    }

    pub fn strategy(&self) -> Result<PruningStrategy> {
        PruningStrategy::by_name(&self.pruning.strategy)
    }

    pub fn importance_config(&self) -> ImportanceConfig {
        ImportanceConfig {
            decay_factor: self.scoring.decay_factor,
            context_window: self.scoring.context_window,
            ..ImportanceConfig::default()
        }
    }
}
