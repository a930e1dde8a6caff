//! Engine and collaborator configuration.

use crate::error::ConfigError;
use sentinel_bandits::{DEFAULT_EPSILON, DEFAULT_LEARNING_RATE};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Session lifetime in seconds.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 1800;
const MAX_SESSION_TTL_SECS: i64 = 86_400;
pub const DEFAULT_HINT_TIMEOUT_MS: u64 = 15_000;
const MIN_HINT_TIMEOUT_MS: u64 = 1_000;
const MAX_HINT_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_GROK_API_URL: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_GROK_MODEL: &str = "grok-3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub epsilon: f64,
    pub learning_rate: f64,
    pub session_ttl_secs: i64,
    pub hint_timeout_ms: u64,
    /// Base seed for per-session random sources. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            learning_rate: DEFAULT_LEARNING_RATE,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            hint_timeout_ms: DEFAULT_HINT_TIMEOUT_MS,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(file)?;
        Ok(config.validate())
    }

    /// Clamps every field into its usable range.
    #[must_use]
    pub fn validate(mut self) -> Self {
        let unit = |v: f64, fallback: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        self.epsilon = unit(self.epsilon, DEFAULT_EPSILON);
        self.learning_rate = unit(self.learning_rate, DEFAULT_LEARNING_RATE);
        if self.session_ttl_secs <= 0 {
            self.session_ttl_secs = DEFAULT_SESSION_TTL_SECS;
        }
        self.session_ttl_secs = self.session_ttl_secs.min(MAX_SESSION_TTL_SECS);
        self.hint_timeout_ms = self
            .hint_timeout_ms
            .clamp(MIN_HINT_TIMEOUT_MS, MAX_HINT_TIMEOUT_MS);
        self
    }

    #[must_use]
    pub fn hint_timeout(&self) -> Duration {
        Duration::from_millis(self.hint_timeout_ms)
    }

    #[must_use]
    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.session_ttl_secs)
    }
}

/// Connection settings for the Grok chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct GrokConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
}

impl GrokConfig {
    /// Reads `GROK_API_KEY` and `GROK_API_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("GROK_API_KEY").unwrap_or_default(),
            api_url: env::var("GROK_API_URL").unwrap_or_else(|_| DEFAULT_GROK_API_URL.to_string()),
            model: DEFAULT_GROK_MODEL.to_string(),
            temperature: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"epsilon": 0.3, "seed": 7}"#).unwrap();
        assert!((cfg.epsilon - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.session_ttl_secs, 1800);
        assert_eq!(cfg.hint_timeout_ms, DEFAULT_HINT_TIMEOUT_MS);
    }

    #[test]
    fn validate_clamps_out_of_range_values() {
        let cfg = EngineConfig {
            epsilon: 4.0,
            learning_rate: f64::NAN,
            session_ttl_secs: -5,
            hint_timeout_ms: 10,
            seed: None,
        }
        .validate();
        assert!((cfg.epsilon - 1.0).abs() < f64::EPSILON);
        assert!((cfg.learning_rate - DEFAULT_LEARNING_RATE).abs() < f64::EPSILON);
        assert_eq!(cfg.session_ttl_secs, DEFAULT_SESSION_TTL_SECS);
        assert_eq!(cfg.hint_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn huge_ttl_is_capped_at_one_day() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"session_ttl_secs": 9223372036854775807}"#).unwrap();
        let cfg = cfg.validate();
        assert_eq!(cfg.session_ttl_secs, MAX_SESSION_TTL_SECS);
        assert_eq!(cfg.session_ttl(), time::Duration::days(1));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "sentinel_engine_config_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"learning_rate": 0.25}"#).unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!((cfg.learning_rate - 0.25).abs() < f64::EPSILON);
        assert!((cfg.epsilon - DEFAULT_EPSILON).abs() < f64::EPSILON);
    }
}
