// THEORY:
// Configuration is a TOML file with a `[detection]` and a `[logging]` table.
// Every field has a default, so an empty file (or a missing table) yields a
// working detector. `DetectionRequest` is the smaller host-facing shape, an
// on/off switch plus a sensitivity level, which the gate's `configure` takes.

use crate::error::ConfigError;
use crate::pipeline::Sensitivity;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_level")]
    pub level: i32,
    /// Minimum time between two analyzed frames.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Frames that may wait for the worker before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Events buffered per event-stream subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            sample_interval_ms: default_sample_interval_ms(),
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl DetectionConfig {
    pub fn request(&self) -> DetectionRequest {
        DetectionRequest {
            enabled: self.enabled,
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// What a host asks of the detector: on or off, and how sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DetectionRequest {
    pub enabled: bool,
    pub level: i32,
}

impl DetectionRequest {
    pub fn sensitivity(&self) -> Sensitivity {
        Sensitivity::from_level(self.level)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

// Default value functions
fn default_enabled() -> bool {
    true
}
fn default_level() -> i32 {
    Sensitivity::DEFAULT.threshold() as i32
}
fn default_sample_interval_ms() -> u64 {
    300
}
fn default_queue_capacity() -> usize {
    2
}
fn default_event_capacity() -> usize {
    16
}
fn default_log_level() -> String {
    "info".into()
}
