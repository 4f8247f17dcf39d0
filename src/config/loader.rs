// src/config/loader.rs

//! Reads a TOML file into [`Config`].

use std::{fs, path::Path};

use log::Level;

use crate::config::model::{Config, ConfigError};
use crate::trace_log;

/// Load and parse the configuration from `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    trace_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    trace_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text. Missing tables and keys take their defaults.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(txt)?)
}
