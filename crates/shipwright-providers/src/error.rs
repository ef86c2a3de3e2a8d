//! Errors from external systems.

use thiserror::Error;

/// Errors from the source forge API.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("no GitHub repository configured")]
    NoRepository,

    #[error("invalid pull request number: {0}")]
    InvalidPullRequest(u64),

    #[error("unable to resolve GitHub token: {0}")]
    Token(String),
}

pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

impl From<ForgeError> for shipwright_core::Error {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::NoRepository => shipwright_core::Error::Config(err.to_string()),
            ForgeError::Token(_) => shipwright_core::Error::Environment(err.to_string()),
            other => shipwright_core::Error::Publish(format!("forge: {}", other)),
        }
    }
}

/// Errors from AWS services.
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("ECR: {0}")]
    Ecr(String),

    #[error("S3: {0}")]
    S3(String),

    #[error("Secrets Manager: {0}")]
    SecretsManager(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AwsResult<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for shipwright_core::Error {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::SecretsManager(_) => shipwright_core::Error::Environment(err.to_string()),
            other => shipwright_core::Error::Publish(other.to_string()),
        }
    }
}
