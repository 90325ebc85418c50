//! Configuration system (layered: code > env > file > defaults).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RheoError};
use crate::util::retry::RetryPolicy;

const ENV_PREFIX: &str = "RHEO_";
const CONFIG_FILE_NAME: &str = "config.toml";
/// Hard cap on automatic turns for a single user message.
pub const MAX_TURNS_PER_MESSAGE_CAP: usize = 100;
/// Context window assumed when neither config nor backend provide one.
pub const DEFAULT_CONTEXT_WINDOW: usize = 30_720;

/// History compression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// Compress once the curated transcript exceeds this share of the context window.
    pub threshold_fraction: f64,
    /// Share of the most recent messages kept verbatim.
    pub preserve_fraction: f64,
    /// Overrides the backend's advertised context length.
    pub context_window: Option<usize>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_fraction: 0.5,
            preserve_fraction: 0.4,
            context_window: None,
        }
    }
}

/// Retry settings for the model backend boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Runtime configuration for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RheoConfig {
    pub model: String,
    /// Ceiling on turns across the whole session; 0 disables it.
    pub max_session_turns: usize,
    pub max_turns_per_message: usize,
    pub max_concurrent_tools: usize,
    pub compression: CompressionSettings,
    pub retry: RetrySettings,
    pub allow_dangerous_operations: bool,
    /// Synthetic input used when the orchestrator recurses on its own.
    pub continue_prompt: String,
    pub debug: bool,
}

impl Default for RheoConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            max_session_turns: 50,
            max_turns_per_message: MAX_TURNS_PER_MESSAGE_CAP,
            max_concurrent_tools: 4,
            compression: CompressionSettings::default(),
            retry: RetrySettings::default(),
            allow_dangerous_operations: false,
            continue_prompt: "Please continue.".to_string(),
            debug: false,
        }
    }
}

impl RheoConfig {
    /// Load defaults, then the platform config file (if present), then env.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        base.with_env_source(|key| std::env::var(key).ok())
    }

    /// Load defaults overlaid with a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            RheoError::Configuration(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rheo")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Overlay `RHEO_*` variables resolved through `lookup`.
    pub fn with_env_source<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(model) = var("MODEL") {
            self.model = model;
        }
        if let Some(raw) = var("MAX_SESSION_TURNS") {
            self.max_session_turns = parse_env("MAX_SESSION_TURNS", &raw)?;
        }
        if let Some(raw) = var("MAX_TURNS_PER_MESSAGE") {
            self.max_turns_per_message = parse_env("MAX_TURNS_PER_MESSAGE", &raw)?;
        }
        if let Some(raw) = var("MAX_CONCURRENT_TOOLS") {
            self.max_concurrent_tools = parse_env("MAX_CONCURRENT_TOOLS", &raw)?;
        }
        if let Some(raw) = var("COMPRESSION_ENABLED") {
            self.compression.enabled = parse_flag(&raw);
        }
        if let Some(raw) = var("COMPRESSION_THRESHOLD") {
            self.compression.threshold_fraction = parse_env("COMPRESSION_THRESHOLD", &raw)?;
        }
        if let Some(raw) = var("COMPRESSION_PRESERVE") {
            self.compression.preserve_fraction = parse_env("COMPRESSION_PRESERVE", &raw)?;
        }
        if let Some(raw) = var("CONTEXT_WINDOW") {
            self.compression.context_window = Some(parse_env("CONTEXT_WINDOW", &raw)?);
        }
        if let Some(raw) = var("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("RETRY_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = var("ALLOW_DANGEROUS") {
            self.allow_dangerous_operations = parse_flag(&raw);
        }
        if let Some(raw) = var("DEBUG") {
            self.debug = parse_flag(&raw);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("compression.threshold_fraction", self.compression.threshold_fraction),
            ("compression.preserve_fraction", self.compression.preserve_fraction),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(RheoError::Configuration(format!(
                    "{name} must be between 0 and 1 (exclusive), got {value}"
                )));
            }
        }
        if self.max_concurrent_tools == 0 {
            return Err(RheoError::Configuration(
                "max_concurrent_tools must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RheoError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_session_turns(mut self, turns: usize) -> Self {
        self.max_session_turns = turns;
        self
    }

    pub fn with_max_turns_per_message(mut self, turns: usize) -> Self {
        self.max_turns_per_message = turns;
        self
    }

    pub fn with_max_concurrent_tools(mut self, limit: usize) -> Self {
        self.max_concurrent_tools = limit.max(1);
        self
    }

    pub fn with_compression(mut self, compression: CompressionSettings) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_allow_dangerous_operations(mut self, allow: bool) -> Self {
        self.allow_dangerous_operations = allow;
        self
    }

    pub fn with_continue_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.continue_prompt = prompt.into();
        self
    }

    /// Automatic turns allowed per user message, never above the hard cap.
    pub fn bounded_turns_per_message(&self) -> usize {
        self.max_turns_per_message.min(MAX_TURNS_PER_MESSAGE_CAP)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: 2.0,
        }
    }
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        RheoError::Configuration(format!("{ENV_PREFIX}{name}: invalid value '{raw}'"))
    })
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let config = RheoConfig::default()
            .with_env_source(env(&[
                ("RHEO_MODEL", "big-model"),
                ("RHEO_MAX_SESSION_TURNS", "7"),
                ("RHEO_ALLOW_DANGEROUS", "true"),
            ]))
            .unwrap();
        assert_eq!(config.model, "big-model");
        assert_eq!(config.max_session_turns, 7);
        assert!(config.allow_dangerous_operations);
        assert_eq!(config.max_concurrent_tools, 4);
    }

    #[test]
    fn unparseable_env_value_is_a_configuration_error() {
        let err = RheoConfig::default()
            .with_env_source(env(&[("RHEO_MAX_CONCURRENT_TOOLS", "many")]))
            .unwrap_err();
        assert!(matches!(err, RheoError::Configuration(_)));
    }

    #[test]
    fn fractions_outside_unit_interval_are_rejected() {
        let err = RheoConfig::default()
            .with_env_source(env(&[("RHEO_COMPRESSION_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("threshold_fraction"));
    }

    #[test]
    fn turns_per_message_are_capped() {
        let config = RheoConfig::default().with_max_turns_per_message(500);
        assert_eq!(config.bounded_turns_per_message(), MAX_TURNS_PER_MESSAGE_CAP);
    }
}
