//! Release tags.
//!
//! A tag is either plain (`v1.2.3`, applies to the whole repository) or mono
//! (`services/api/v1.2.3`, applies to the project at that path or alias).

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTag {
    /// The tag as written, e.g. `app/v1.2.3`.
    pub full: String,
    /// Mono prefix, e.g. `app`.
    pub prefix: Option<String>,
    /// Version component including the `v`, e.g. `v1.2.3`.
    pub version: String,
}

impl ProjectTag {
    /// Parse a tag. Returns `None` if the version component is not `v` + semver.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        let (prefix, version) = match tag.rsplit_once('/') {
            Some((prefix, version)) if !prefix.is_empty() => (Some(prefix), version),
            Some(_) => return None,
            None => (None, tag),
        };
        let semver = version.strip_prefix('v')?;
        semver::Version::parse(semver).ok()?;
        Some(Self {
            full: tag.to_string(),
            prefix: prefix.map(String::from),
            version: version.to_string(),
        })
    }

    /// Whether the tag selects the project at `rel_path`: plain tags always do,
    /// mono tags when the prefix is the path or an alias for it.
    pub fn matches_path(&self, rel_path: &str, aliases: &BTreeMap<String, String>) -> bool {
        let Some(prefix) = &self.prefix else {
            return true;
        };
        prefix == rel_path
            || aliases
                .get(prefix)
                .is_some_and(|alias| alias.trim_end_matches('/') == rel_path)
    }

    /// Like [`Self::matches_path`], also accepting the project name as prefix.
    pub fn matches_project(
        &self,
        name: &str,
        rel_path: &str,
        aliases: &BTreeMap<String, String>,
    ) -> bool {
        self.prefix.as_deref() == Some(name) || self.matches_path(rel_path, aliases)
    }
}

impl fmt::Display for ProjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

/// Pick the first tag (in sorted order) that parses and selects the project.
pub fn select_tag<'a, I>(tags: I, rel_path: &str, aliases: &BTreeMap<String, String>) -> Option<ProjectTag>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tags: Vec<&str> = tags.into_iter().collect();
    tags.sort_unstable();
    tags.into_iter()
        .filter_map(ProjectTag::parse)
        .find(|tag| tag.matches_path(rel_path, aliases))
}
