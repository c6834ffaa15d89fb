//! Engine configuration.
//!
//! Loaded from TOML; every field has a default, so a partial file (or none)
//! is valid. A handful of knobs can be overridden from the environment with
//! [`EngineConfig::apply_env`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::evaluation::MAX_SCORE;
use crate::domain::params::{
    DEFAULT_BEATS_PER_CLIP, DEFAULT_CLUSTER_GAP_SECS, DEFAULT_MAX_BLEND_WINDOW,
    DEFAULT_MIN_CLIP_DURATION,
};
use crate::domain::{BeatcutError, Result, SynthesisParams};

pub const ENV_MAX_ITERATIONS: &str = "BEATCUT_MAX_ITERATIONS";
pub const ENV_SCORE_THRESHOLD: &str = "BEATCUT_SCORE_THRESHOLD";
pub const ENV_MAX_INFLIGHT: &str = "BEATCUT_MAX_INFLIGHT";
pub const ENV_LOG_JSON: &str = "BEATCUT_LOG_JSON";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub synthesis: SynthesisDefaults,
    pub controller: ControllerConfig,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub log: LogConfig,
}

/// Defaults applied to every request's initial `SynthesisParams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisDefaults {
    pub cluster_gap_secs: f64,
    pub beats_per_clip: u32,
    pub min_clip_duration: f64,
    pub max_blend_window: f64,
    pub snap_to_beats: bool,
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            cluster_gap_secs: DEFAULT_CLUSTER_GAP_SECS,
            beats_per_clip: DEFAULT_BEATS_PER_CLIP,
            min_clip_duration: DEFAULT_MIN_CLIP_DURATION,
            max_blend_window: DEFAULT_MAX_BLEND_WINDOW,
            snap_to_beats: false,
        }
    }
}

impl SynthesisDefaults {
    pub fn params(&self) -> SynthesisParams {
        SynthesisParams {
            cluster_gap_secs: self.cluster_gap_secs,
            beats_per_clip: self.beats_per_clip,
            min_clip_duration: self.min_clip_duration,
            max_blend_window: self.max_blend_window,
            snap_to_beats: self.snap_to_beats,
            ..SynthesisParams::default()
        }
    }
}

/// Loop bounds and per-phase budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub max_iterations: u32,
    pub score_threshold: f64,
    pub synthesis_budget_ms: u64,
    pub render_timeout_ms: u64,
    pub evaluate_timeout_ms: u64,
    pub translate_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            score_threshold: 7.0,
            synthesis_budget_ms: 2_000,
            render_timeout_ms: 300_000,
            evaluate_timeout_ms: 120_000,
            translate_timeout_ms: 30_000,
        }
    }
}

impl ControllerConfig {
    pub fn synthesis_budget(&self) -> Duration {
        Duration::from_millis(self.synthesis_budget_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn evaluate_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluate_timeout_ms)
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_millis(self.translate_timeout_ms)
    }
}

/// Backoff for failed collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Render/evaluate/translate calls in flight across all requests.
    pub max_inflight_adapter_calls: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_inflight_adapter_calls: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BeatcutError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `BEATCUT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_MAX_ITERATIONS) {
            self.controller.max_iterations = parse_env(ENV_MAX_ITERATIONS, &v)?;
        }
        if let Some(v) = lookup(ENV_SCORE_THRESHOLD) {
            self.controller.score_threshold = parse_env(ENV_SCORE_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_INFLIGHT) {
            self.concurrency.max_inflight_adapter_calls = parse_env(ENV_MAX_INFLIGHT, &v)?;
        }
        if let Some(v) = lookup(ENV_LOG_JSON) {
            self.log.json = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(BeatcutError::Config(format!("{ENV_LOG_JSON}={v}"))),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.controller;
        if !c.score_threshold.is_finite() || !(0.0..=MAX_SCORE).contains(&c.score_threshold) {
            return Err(BeatcutError::Config(format!(
                "score_threshold {} is outside [0, {MAX_SCORE}]",
                c.score_threshold
            )));
        }
        for (name, ms) in [
            ("synthesis_budget_ms", c.synthesis_budget_ms),
            ("render_timeout_ms", c.render_timeout_ms),
            ("evaluate_timeout_ms", c.evaluate_timeout_ms),
            ("translate_timeout_ms", c.translate_timeout_ms),
        ] {
            if ms == 0 {
                return Err(BeatcutError::Config(format!("{name} must be > 0")));
            }
        }
        let r = &self.retry;
        if r.max_attempts == 0 {
            return Err(BeatcutError::Config("retry.max_attempts must be > 0".into()));
        }
        if !r.multiplier.is_finite() || r.multiplier < 1.0 {
            return Err(BeatcutError::Config(format!(
                "retry.multiplier must be >= 1, got {}",
                r.multiplier
            )));
        }
        if r.max_backoff_ms < r.initial_backoff_ms {
            return Err(BeatcutError::Config(
                "retry.max_backoff_ms must be >= initial_backoff_ms".into(),
            ));
        }
        if self.concurrency.max_inflight_adapter_calls == 0 {
            return Err(BeatcutError::Config(
                "concurrency.max_inflight_adapter_calls must be > 0".into(),
            ));
        }
        self.synthesis.params().validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BeatcutError::Config(format!("cannot parse {key}={value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert_eq!(config.controller.max_iterations, 3);
        assert_eq!(config.controller.score_threshold, 7.0);
        assert_eq!(config.retry.max_attempts, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [controller]
            max_iterations = 5

            [synthesis]
            snap_to_beats = true
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.max_iterations, 5);
        assert_eq!(config.controller.score_threshold, 7.0);
        assert!(config.synthesis.snap_to_beats);
        assert_eq!(config.synthesis.beats_per_clip, 4);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_ITERATIONS, "1"),
            (ENV_SCORE_THRESHOLD, "8.5"),
            (ENV_LOG_JSON, "true"),
        ]
        .into();
        let mut config = EngineConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.controller.max_iterations, 1);
        assert_eq!(config.controller.score_threshold, 8.5);
        assert!(config.log.json);
    }

    #[test]
    fn test_unparsable_env_is_config_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env_from(|k| (k == ENV_MAX_INFLIGHT).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, BeatcutError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_and_bad_threshold() {
        let mut config = EngineConfig::default();
        config.concurrency.max_inflight_adapter_calls = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.controller.score_threshold = 11.0;
        assert!(config.validate().is_err());
    }
}
