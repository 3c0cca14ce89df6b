use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GeomagError {
    #[error("decode failed at line {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("path template error: {0}")]
    Template(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("unable to truncate timestamp: {0}")]
    Truncate(String),

    #[error("missing config file geomag.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("reading source failed: {0}")]
    Source(String),
}

impl GeomagError {
    pub fn decode(line: usize, message: impl Into<String>) -> Self {
        GeomagError::Decode {
            line,
            message: message.into(),
        }
    }
}
