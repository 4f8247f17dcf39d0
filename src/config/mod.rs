//! Public API for configuration

pub mod loader;
pub mod model;

pub use loader::load;
pub use model::{Config, ConfigError, ConsumerConfig, LoggingConfig};
