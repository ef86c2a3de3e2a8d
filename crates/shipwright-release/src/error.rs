//! Release errors and outcomes.

use std::fmt;
use thiserror::Error;

/// A failed release, tagged with the project and release it belongs to.
#[derive(Debug, Error)]
#[error("{project}/{release}: {source}")]
pub struct ReleaseError {
    pub project: String,
    pub release: String,
    #[source]
    pub source: shipwright_core::Error,
}

impl ReleaseError {
    pub fn new(project: impl Into<String>, release: impl Into<String>, source: shipwright_core::Error) -> Self {
        Self {
            project: project.into(),
            release: release.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }

    /// The terminal state this failure leaves the release in.
    pub fn state(&self) -> ReleaseState {
        match &self.source {
            shipwright_core::Error::Build(_) => ReleaseState::BuildFailed,
            shipwright_core::Error::Validation(_) => ReleaseState::ValidationFailed,
            shipwright_core::Error::Publish(_) => ReleaseState::PublishFailed,
            _ => ReleaseState::Aborted,
        }
    }
}

pub type ReleaseResult<T> = std::result::Result<T, ReleaseError>;

/// Terminal state of one release invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// No event fired and the release was not forced.
    Skipped,
    Succeeded,
    BuildFailed,
    ValidationFailed,
    PublishFailed,
    /// Configuration, environment or cancellation failure.
    Aborted,
}

impl ReleaseState {
    pub fn is_success(&self) -> bool {
        matches!(self, ReleaseState::Skipped | ReleaseState::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseState::Skipped => "skipped",
            ReleaseState::Succeeded => "succeeded",
            ReleaseState::BuildFailed => "build-failed",
            ReleaseState::ValidationFailed => "validation-failed",
            ReleaseState::PublishFailed => "publish-failed",
            ReleaseState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
