//! Earthfile target discovery.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Build file name in a project directory.
pub const BUILD_FILE: &str = "Earthfile";

// Targets are unindented `name:` lines.
static TARGET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z0-9][a-zA-Z0-9._-]*):\s*(?:#.*)?$").expect("valid target regex"));

/// A parsed build file.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BuildFile {
    pub path: PathBuf,
    pub targets: Vec<String>,
}

impl BuildFile {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        let targets = content
            .lines()
            .filter_map(|line| TARGET_REGEX.captures(line))
            .map(|caps| caps[1].to_string())
            .collect();
        Self {
            path: path.into(),
            targets,
        }
    }

    /// Read `dir/Earthfile` if it exists.
    pub fn read(dir: &Path) -> std::io::Result<Option<Self>> {
        let path = dir.join(BUILD_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(Self::parse(path, &content)))
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t == name)
    }
}
