//! Configuration module for the instructor engine
//!
//! Configuration comes from YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//!
//! # Example
//! ```rust,no_run
//! use realtime_instructor::config::EngineConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = EngineConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config = EngineConfig::from_file(Path::new("instructor.yaml"))?;
//! println!("Model: {}", config.session.model);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

mod yaml;

pub use yaml::{AudioYaml, QueueYaml, RateLimitYaml, SessionYaml, YamlConfig};

use crate::core::admission::RateLimitConfig;
use crate::core::audio::AudioConfig;
use crate::core::queue::QueueConfig;
use crate::core::realtime::SessionSettings;
use crate::core::realtime::openai::OpenAIRealtimeVoice;

/// Environment variable holding the OpenAI API key.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the realtime model.
pub const ENV_MODEL: &str = "INSTRUCTOR_MODEL";
/// Environment variable overriding the voice.
pub const ENV_VOICE: &str = "INSTRUCTOR_VOICE";
/// Environment variable overriding the realtime endpoint.
pub const ENV_REALTIME_URL: &str = "INSTRUCTOR_REALTIME_URL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete engine configuration, supplied at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection and session handshake settings
    pub session: SessionSettings,
    /// Admission rate limiting
    pub rate_limit: RateLimitConfig,
    /// Request queue
    pub queue: QueueConfig,
    /// Output audio
    pub audio: AudioConfig,
    /// Kinds whose latest instruction is re-sent after a hard reset.
    /// Default: ["Directions"]
    pub sticky_kinds: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            rate_limit: RateLimitConfig::default(),
            queue: QueueConfig::default(),
            audio: AudioConfig::default(),
            sticky_kinds: vec!["Directions".to_string()],
        }
    }
}

impl EngineConfig {
    /// Load from environment variables (and a `.env` file when present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a YAML file. Environment variables fill what the file leaves unset.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let yaml = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env_overrides();
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document over the defaults, without consulting the environment.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_yaml(YamlConfig::parse(contents)?);
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.session.api_key = api_key;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.session.model = model;
        }
        if let Some(voice) = non_empty(ENV_VOICE) {
            self.session.voice = voice;
        }
        if let Some(url) = non_empty(ENV_REALTIME_URL) {
            self.session.endpoint = url;
        }
    }

    /// Apply every value present in the YAML document.
    pub fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(s) = yaml.session {
            let session = &mut self.session;
            if let Some(v) = s.endpoint {
                session.endpoint = v;
            }
            if let Some(v) = s.api_key {
                session.api_key = v;
            }
            if let Some(v) = s.model {
                session.model = v;
            }
            if let Some(v) = s.voice {
                session.voice = v;
            }
            if let Some(v) = s.instructions {
                session.instructions = v;
            }
            if let Some(v) = s.input_sample_rate {
                session.input_sample_rate = v;
            }
            if let Some(v) = s.output_sample_rate {
                session.output_sample_rate = v;
            }
            if let Some(v) = s.temperature {
                session.temperature = v;
            }
            if let Some(v) = s.transcription_enabled {
                session.transcription_enabled = v;
            }
            if let Some(v) = s.transcription_model {
                session.transcription_model = v;
            }
            if let Some(v) = s.connect_timeout_ms {
                session.connect_timeout_ms = v;
            }
        }

        if let Some(r) = yaml.rate_limit {
            let rate_limit = &mut self.rate_limit;
            if let Some(v) = r.global_cooldown_ms {
                rate_limit.global_cooldown_ms = v;
            }
            if let Some(v) = r.per_kind_cooldown_ms {
                rate_limit.per_kind_cooldown_ms = v;
            }
            if let Some(v) = r.kind_cooldowns_ms {
                rate_limit.kind_cooldowns_ms = v;
            }
            if let Some(v) = r.exempt_kinds {
                rate_limit.exempt_kinds = v;
            }
            if let Some(v) = r.lenient_kinds {
                rate_limit.lenient_kinds = v;
            }
            if let Some(v) = r.violations_before_prompt {
                rate_limit.violations_before_prompt = v;
            }
            if let Some(v) = r.recount_cooldown_ms {
                rate_limit.recount_cooldown_ms = v;
            }
        }

        if let Some(q) = yaml.queue {
            if let Some(v) = q.capacity {
                self.queue.capacity = v;
            }
            if let Some(v) = q.overflow {
                self.queue.overflow = v;
            }
            if q.response_timeout_ms.is_some() {
                self.queue.response_timeout_ms = q.response_timeout_ms;
            }
        }

        if let Some(a) = yaml.audio {
            if let Some(v) = a.output_sample_rate {
                self.audio.output_sample_rate = v;
            }
            if let Some(v) = a.buffer_seconds {
                self.audio.buffer_seconds = v;
            }
            if let Some(v) = a.silence_rms {
                self.audio.silence_rms = v;
            }
        }

        if let Some(v) = yaml.sticky_kinds {
            self.sticky_kinds = v;
        }
    }

    /// Check the configuration before an engine is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "API key is required (set {ENV_API_KEY} or session.api_key)"
            )));
        }
        match Url::parse(&session.endpoint) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid(format!(
                    "endpoint must be a ws:// or wss:// URL, got {}://",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "invalid endpoint '{}': {e}",
                    session.endpoint
                )));
            }
        }
        if session.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if session.input_sample_rate == 0 || session.output_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "session sample rates must be positive".to_string(),
            ));
        }
        if self.audio.output_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "audio.output_sample_rate must be positive".to_string(),
            ));
        }
        if !(self.audio.buffer_seconds.is_finite() && self.audio.buffer_seconds > 0.0) {
            return Err(ConfigError::Invalid(
                "audio.buffer_seconds must be positive".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue.capacity must be at least 1".to_string(),
            ));
        }
        if !session.temperature.is_finite() || session.temperature < 0.0 {
            return Err(ConfigError::Invalid(
                "temperature must be a non-negative number".to_string(),
            ));
        }
        if OpenAIRealtimeVoice::parse(&session.voice).is_none() {
            tracing::warn!(voice = %session.voice, "Unknown voice, the API may reject it");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::OverflowPolicy;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var(ENV_API_KEY);
            env::remove_var(ENV_MODEL);
            env::remove_var(ENV_VOICE);
            env::remove_var(ENV_REALTIME_URL);
        }
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session.model, "gpt-realtime-mini");
        assert_eq!(config.rate_limit.global_cooldown_ms, 10_000);
        assert_eq!(config.queue.capacity, 25);
        assert_eq!(config.queue.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.audio.output_sample_rate, 48000);
        assert_eq!(config.sticky_kinds, vec!["Directions"]);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[
            (ENV_API_KEY, "sk-env"),
            (ENV_MODEL, "gpt-realtime"),
            (ENV_VOICE, "  "),
        ]));

        assert_eq!(config.session.api_key, "sk-env");
        assert_eq!(config.session.model, "gpt-realtime");
        // Blank values are ignored.
        assert_eq!(config.session.voice, "ash");
    }

    #[test]
    fn test_yaml_overrides_env() {
        let mut config = EngineConfig::default();
        config.apply_env_with(env(&[(ENV_API_KEY, "sk-env"), (ENV_MODEL, "env-model")]));
        config.apply_yaml(YamlConfig::parse("session:\n  model: yaml-model\n").unwrap());

        assert_eq!(config.session.model, "yaml-model");
        assert_eq!(config.session.api_key, "sk-env");
    }

    #[test]
    fn test_from_yaml_str_keeps_defaults() {
        let config = EngineConfig::from_yaml_str(
            "queue:\n  capacity: 5\n  overflow: reject_new\nrate_limit:\n  lenient_kinds: []\n",
        )
        .unwrap();

        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.queue.overflow, OverflowPolicy::RejectNew);
        assert!(config.rate_limit.lenient_kinds.is_empty());
        assert_eq!(config.rate_limit.exempt_kinds, vec!["Directions"]);
        assert_eq!(config.session.voice, "ash");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var(ENV_API_KEY, "sk-from-env");
            env::set_var(ENV_REALTIME_URL, "ws://127.0.0.1:9001/v1/realtime");
        }

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.session.api_key, "sk-from-env");
        assert_eq!(config.session.endpoint, "ws://127.0.0.1:9001/v1/realtime");
        assert!(config.validate().is_ok());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instructor.yaml");
        fs::write(&path, "session:\n  model: yaml-model\n").unwrap();

        unsafe {
            env::set_var(ENV_API_KEY, "sk-env");
            env::set_var(ENV_MODEL, "env-model");
        }

        let config = EngineConfig::from_file(&path).unwrap();
        // YAML overrides ENV
        assert_eq!(config.session.model, "yaml-model");
        // ENV fills what YAML leaves unset
        assert_eq!(config.session.api_key, "sk-env");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_validates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instructor.yaml");
        fs::write(
            &path,
            "session:\n  api_key: sk-file\nqueue:\n  capacity: 0\n",
        )
        .unwrap();

        let result = EngineConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_from_file_valid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("instructor.yaml");
        fs::write(&path, "session:\n  api_key: sk-file\n  voice: coral\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.session.api_key, "sk-file");
        assert_eq!(config.session.voice, "coral");
    }

    #[test]
    fn test_validate() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_err());

        config.session.api_key = "sk-test".to_string();
        assert!(config.validate().is_ok());

        config.session.output_sample_rate = 0;
        assert!(config.validate().is_err());
        config.session.output_sample_rate = 24000;

        config.audio.buffer_seconds = 0.0;
        assert!(config.validate().is_err());
        config.audio.buffer_seconds = 10.0;

        config.session.endpoint = "https://api.openai.com/v1/realtime".to_string();
        assert!(config.validate().is_err());
        config.session.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
