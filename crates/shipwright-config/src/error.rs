//! Blueprint configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("invalid node {node}: {message}")]
    Syntax { node: String, message: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("incomplete value at {0}: unresolved attribute")]
    Incomplete(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for shipwright_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => shipwright_core::Error::Environment(e.to_string()),
            other => shipwright_core::Error::Config(other.to_string()),
        }
    }
}
