use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::ConfigError;
use crate::core::queue::OverflowPolicy;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables, which override defaults.
///
/// # Example YAML structure
/// ```yaml
/// session:
///   api_key: "sk-..."
///   model: "gpt-realtime-mini"
///   voice: "ash"
///   input_sample_rate: 16000
///   output_sample_rate: 24000
///   temperature: 0.6
///   transcription_enabled: true
///
/// rate_limit:
///   global_cooldown_ms: 10000
///   per_kind_cooldown_ms: 15000
///   kind_cooldowns_ms:
///     Crash: 5000
///   exempt_kinds: ["Directions"]
///   lenient_kinds: ["LaneWarning"]
///   violations_before_prompt: 2
///   recount_cooldown_ms: 3000
///
/// queue:
///   capacity: 25
///   overflow: drop_oldest
///   response_timeout_ms: 30000
///
/// audio:
///   output_sample_rate: 48000
///   buffer_seconds: 10
///
/// sticky_kinds: ["Directions"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub session: Option<SessionYaml>,
    pub rate_limit: Option<RateLimitYaml>,
    pub queue: Option<QueueYaml>,
    pub audio: Option<AudioYaml>,
    pub sticky_kinds: Option<Vec<String>>,
}

/// Session configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub temperature: Option<f32>,
    pub transcription_enabled: Option<bool>,
    pub transcription_model: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Rate limiting configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitYaml {
    pub global_cooldown_ms: Option<u64>,
    pub per_kind_cooldown_ms: Option<u64>,
    pub kind_cooldowns_ms: Option<HashMap<String, u64>>,
    pub exempt_kinds: Option<Vec<String>>,
    pub lenient_kinds: Option<Vec<String>>,
    pub violations_before_prompt: Option<u32>,
    pub recount_cooldown_ms: Option<u64>,
}

/// Queue configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QueueYaml {
    pub capacity: Option<usize>,
    pub overflow: Option<OverflowPolicy>,
    pub response_timeout_ms: Option<u64>,
}

/// Audio configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub output_sample_rate: Option<u32>,
    pub buffer_seconds: Option<f32>,
    pub silence_rms: Option<f32>,
}

impl YamlConfig {
    /// Parse a YAML document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not a mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }
}
