// src/config/model.rs

use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

/// Default upper bound on a single record payload read back from a file.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Top-level runtime config. Every table is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)] pub logging:  LoggingConfig,
    #[serde(default)] pub consumer: ConsumerConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]                   pub enable: bool,
    #[serde(default)]                   pub file:   Option<String>,
    #[serde(default = "default_level")] pub level:  String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

impl LoggingConfig {
    /// Unknown level names fall back to INFO.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_uppercase().as_str() {
            "OFF"   => LevelFilter::Off,
            "ERROR" => LevelFilter::Error,
            "WARN"  => LevelFilter::Warn,
            "DEBUG" => LevelFilter::Debug,
            "TRACE" => LevelFilter::Trace,
            _       => LevelFilter::Info,
        }
    }
}

/// Mirror of the `[consumer]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Replayed records with a larger payload are rejected as corrupt.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,
}
fn default_max_payload_len() -> usize { DEFAULT_MAX_PAYLOAD_LEN }

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { max_payload_len: DEFAULT_MAX_PAYLOAD_LEN }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
