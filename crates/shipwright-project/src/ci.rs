//! GitHub Actions environment.
//!
//! Reads:
//! - `GITHUB_ACTIONS` - set when running under Actions
//! - `GITHUB_REF` - `refs/heads/<branch>` or `refs/tags/<tag>`
//! - `GITHUB_HEAD_REF` - source branch of a pull request
//! - `GITHUB_EVENT_NAME` - triggering event
//! - `GITHUB_EVENT_NUMBER` / `GITHUB_EVENT_PATH` - pull request number
//! - `GITHUB_TOKEN` - API token
//! - `GITHUB_REPOSITORY` - `owner/repo`

use serde::Serialize;
use shipwright_core::Environment;
use std::path::Path;
use tracing::warn;

/// Snapshot of the CI environment taken when a project is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CiContext {
    pub in_ci: bool,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub is_pr: bool,
    pub pr_number: Option<u64>,
    pub event_name: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
    pub repository: Option<String>,
}

impl CiContext {
    /// Context for a local run: not in CI, no PR, no ref information.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn from_env(env: &dyn Environment) -> Self {
        let github_ref = env.non_empty("GITHUB_REF");
        let head_ref = env.non_empty("GITHUB_HEAD_REF");
        let event_name = env.non_empty("GITHUB_EVENT_NAME");

        let branch = head_ref.clone().or_else(|| {
            github_ref
                .as_deref()
                .and_then(|r| r.strip_prefix("refs/heads/"))
                .map(String::from)
        });
        let tag = github_ref
            .as_deref()
            .and_then(|r| r.strip_prefix("refs/tags/"))
            .map(String::from);
        let is_pr = head_ref.is_some() || event_name.as_deref() == Some("pull_request");

        let pr_number = if is_pr { pr_number(env) } else { None };

        Self {
            in_ci: env.non_empty("GITHUB_ACTIONS").is_some(),
            branch,
            tag,
            is_pr,
            pr_number,
            event_name,
            token: env.non_empty("GITHUB_TOKEN"),
            repository: env.non_empty("GITHUB_REPOSITORY"),
        }
    }
}

fn pr_number(env: &dyn Environment) -> Option<u64> {
    if let Some(number) = env.non_empty("GITHUB_EVENT_NUMBER") {
        match number.parse() {
            Ok(n) => return Some(n),
            Err(_) => warn!(value = %number, "Ignoring non-numeric GITHUB_EVENT_NUMBER"),
        }
    }
    let path = env.non_empty("GITHUB_EVENT_PATH")?;
    pr_number_from_event(Path::new(&path))
}

fn pr_number_from_event(path: &Path) -> Option<u64> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read GitHub event payload");
            return None;
        }
    };
    let payload: serde_json::Value = match serde_json::from_str(&content) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse GitHub event payload");
            return None;
        }
    };
    payload
        .pointer("/pull_request/number")
        .and_then(serde_json::Value::as_u64)
}
