use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file passed to [`ConfigLoader::file`](super::ConfigLoader::file) is missing.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Unknown extension, or its format feature is compiled out.
    #[error("no enabled config format handles `.{0}` files")]
    UnsupportedFormat(String),

    #[error("could not read configuration: {0}")]
    Extract(#[source] Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    Validation { message: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// Boxed since figment::Error is large.
impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
