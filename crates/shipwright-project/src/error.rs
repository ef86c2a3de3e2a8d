//! Project loading errors.

use shipwright_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no blueprint declares a project at {0}")]
    NoBlueprint(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no git repository found above {0}")]
    GitDiscovery(PathBuf),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("unknown tagging strategy: {0}")]
    TaggingStrategy(String),

    #[error("invalid target {target}: {message}")]
    Target { target: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] shipwright_core::Error),
}

pub type ProjectResult<T> = std::result::Result<T, ProjectError>;

impl From<ProjectError> for shipwright_core::Error {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::Config(e) => e.into(),
            ProjectError::Core(e) => e,
            ProjectError::NoBlueprint(_)
            | ProjectError::TaggingStrategy(_)
            | ProjectError::Target { .. } => {
                shipwright_core::Error::Config(err.to_string())
            }
            ProjectError::GitDiscovery(_) | ProjectError::Git { .. } | ProjectError::Io(_) => {
                shipwright_core::Error::Environment(err.to_string())
            }
        }
    }
}
