//! Build errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("target {target} failed on {platform} after {attempts} attempt(s)\n{output}")]
    Failed {
        target: String,
        platform: String,
        attempts: u32,
        /// Tail of the combined output of the last attempt.
        output: String,
    },

    #[error("unable to get secret {path} from provider {provider}: {message}")]
    SecretUnavailable {
        provider: String,
        path: String,
        message: String,
    },

    #[error("invalid secret {path}: {message}")]
    SecretFormat { path: String, message: String },

    #[error(transparent)]
    Project(#[from] shipwright_project::ProjectError),

    #[error(transparent)]
    Core(#[from] shipwright_core::Error),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

impl From<BuildError> for shipwright_core::Error {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Core(e) => e,
            BuildError::Project(e) => e.into(),
            BuildError::Failed { .. } => shipwright_core::Error::Build(err.to_string()),
            BuildError::SecretUnavailable { .. } => {
                shipwright_core::Error::Environment(err.to_string())
            }
            BuildError::SecretFormat { .. } => shipwright_core::Error::Config(err.to_string()),
        }
    }
}
