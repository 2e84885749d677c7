//! `[router]` and `[logging]` settings, where they come from, and the range
//! checks applied before a runtime accepts them.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ParleyConfig, SpanEventConfig,
};
pub use validation::validate_config;
