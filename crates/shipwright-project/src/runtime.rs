//! Runtime data available to `(runtime)` attributes.
//!
//! - `GIT_COMMIT_HASH` - HEAD commit
//! - `GIT_TAG_GENERATED` - tag produced by the tagging strategy
//! - `GIT_TAG` - version of the tag selecting this project, if any
//! - `GIT_TAG_FULL` - that tag as written
//! - `GIT_IMAGE_TAG` - `GIT_TAG` if present, else `GIT_TAG_GENERATED`

use std::collections::BTreeMap;

use crate::tag::ProjectTag;
use crate::{ProjectError, ProjectResult};

pub const GIT_COMMIT_HASH: &str = "GIT_COMMIT_HASH";
pub const GIT_TAG_GENERATED: &str = "GIT_TAG_GENERATED";
pub const GIT_TAG: &str = "GIT_TAG";
pub const GIT_TAG_FULL: &str = "GIT_TAG_FULL";
pub const GIT_IMAGE_TAG: &str = "GIT_IMAGE_TAG";

/// Tagging strategy producing `GIT_TAG_GENERATED` from the commit hash.
pub const STRATEGY_COMMIT: &str = "commit";

/// Gather runtime data. `tag` must already be known to select the project.
pub fn runtime_data(
    commit: &str,
    strategy: &str,
    tag: Option<&ProjectTag>,
) -> ProjectResult<BTreeMap<String, String>> {
    let mut data = BTreeMap::new();
    if !commit.is_empty() {
        data.insert(GIT_COMMIT_HASH.to_string(), commit.to_string());
    }

    let generated = match strategy {
        STRATEGY_COMMIT | "git-commit" if !commit.is_empty() => Some(commit.to_string()),
        STRATEGY_COMMIT | "git-commit" => None,
        other => return Err(ProjectError::TaggingStrategy(other.to_string())),
    };
    if let Some(generated) = &generated {
        data.insert(GIT_TAG_GENERATED.to_string(), generated.clone());
    }

    if let Some(tag) = tag {
        data.insert(GIT_TAG.to_string(), tag.version.clone());
        data.insert(GIT_TAG_FULL.to_string(), tag.full.clone());
    }

    if let Some(image_tag) = tag.map(|t| t.version.clone()).or(generated) {
        data.insert(GIT_IMAGE_TAG.to_string(), image_tag);
    }
    Ok(data)
}
