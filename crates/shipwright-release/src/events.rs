//! Release events.
//!
//! A release lists the events it publishes on. Each event is evaluated
//! against the loaded project and its CI context; evaluation has no side
//! effects.

use serde::Deserialize;
use shipwright_core::{Error, Result};
use shipwright_project::Project;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

/// A recognized release event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseEvent {
    /// The current branch is the configured (or default) branch.
    Merge,
    /// The project has a tag that selects it.
    Tag,
    /// Running in CI for an open pull request.
    PullRequest,
    Always,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MergeConfig {
    branch: Option<String>,
}

impl ReleaseEvent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "merge" => Some(ReleaseEvent::Merge),
            "tag" => Some(ReleaseEvent::Tag),
            "pull_request" | "pull-request" => Some(ReleaseEvent::PullRequest),
            "always" => Some(ReleaseEvent::Always),
            _ => None,
        }
    }

    pub fn firing(&self, project: &Project, config: &serde_json::Value) -> Result<bool> {
        match self {
            ReleaseEvent::Merge => {
                let config: MergeConfig = match config {
                    serde_json::Value::Null => MergeConfig::default(),
                    other => serde_json::from_value(other.clone())
                        .map_err(|e| Error::Config(format!("invalid merge event: {}", e)))?,
                };
                let branch = config
                    .branch
                    .as_deref()
                    .unwrap_or_else(|| project.default_branch());
                Ok(project.branch() == Some(branch))
            }
            ReleaseEvent::Tag => Ok(project.tag_matches()),
            ReleaseEvent::PullRequest => Ok(project.ci.in_ci && project.ci.is_pr),
            ReleaseEvent::Always => Ok(true),
        }
    }
}

/// Evaluates a release's `on` block.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEvaluator;

impl EventEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Whether a single named event fires. Unknown events never fire.
    pub fn firing(&self, project: &Project, name: &str, config: &serde_json::Value) -> Result<bool> {
        match ReleaseEvent::parse(name) {
            Some(event) => event.firing(project, config),
            None => {
                warn!(event = %name, "Unknown release event");
                Ok(false)
            }
        }
    }

    /// Whether any event fires, checked in key order. An erroring event is
    /// logged and counted as not firing.
    pub fn any_firing(&self, project: &Project, events: &BTreeMap<String, serde_json::Value>) -> bool {
        for (name, config) in events {
            debug!(project = %project.name, event = %name, "Checking release event");
            match self.firing(project, name, config) {
                Ok(true) => {
                    debug!(event = %name, "Release event is firing");
                    return true;
                }
                Ok(false) => {}
                Err(e) => error!(event = %name, error = %e, "Failed to evaluate release event"),
            }
        }
        false
    }
}
