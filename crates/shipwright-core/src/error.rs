//! Error types for shipwright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration, unknown release type, incomplete document.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing binary, missing secret, missing repository, unreachable forge.
    #[error("environment error: {0}")]
    Environment(String),

    /// The build driver exited non-zero after exhausting retries.
    #[error("build failed: {0}")]
    Build(String),

    /// An expected output was missing after the build.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A registry, forge or object-store call failed.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::Environment(_) | Error::Validation(_) => 1,
            Error::Build(_) => 2,
            Error::Publish(_) => 3,
            Error::Cancelled => 4,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
