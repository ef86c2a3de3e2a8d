//! Loaded projects.

use regex::Regex;
use shipwright_config::Value;
use shipwright_config::schema::{Global, ProjectConfig, Release, Target};
use std::path::PathBuf;

use crate::buildfile::BuildFile;
use crate::ci::CiContext;
use crate::git::GitState;
use crate::tag::ProjectTag;
use crate::{ProjectError, ProjectResult};

/// A project with its fully resolved blueprint.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    /// Absolute project directory.
    pub path: PathBuf,
    pub repo_root: PathBuf,
    /// Path relative to the repository root, `.` for the root itself.
    pub rel_path: String,
    pub global: Global,
    pub config: ProjectConfig,
    /// The resolved document the typed views were decoded from.
    pub document: Value,
    pub build_file: Option<BuildFile>,
    pub tag: Option<ProjectTag>,
    pub git: GitState,
    pub ci: CiContext,
}

impl Project {
    pub fn release(&self, name: &str) -> Option<&Release> {
        self.config.release.get(name)
    }

    /// Image name: `project.container`, else the project name.
    pub fn container_name(&self) -> &str {
        self.config.container.as_deref().unwrap_or(&self.name)
    }

    /// Current branch: the CI ref when in CI, else the checked-out branch.
    pub fn branch(&self) -> Option<&str> {
        if self.ci.in_ci {
            self.ci.branch.as_deref().or(self.git.branch.as_deref())
        } else {
            self.git.branch.as_deref()
        }
    }

    pub fn default_branch(&self) -> &str {
        &self.global.repo.default_branch
    }

    pub fn on_default_branch(&self) -> bool {
        self.branch() == Some(self.default_branch())
    }

    /// Whether the project's tag selects it (plain, or mono by name, path or alias).
    pub fn tag_matches(&self) -> bool {
        self.tag.as_ref().is_some_and(|tag| {
            tag.matches_project(&self.name, &self.rel_path, &self.global.ci.tagging.aliases)
        })
    }

    /// Effective configuration of a target.
    ///
    /// Target keys may be regular expressions. Every key that fully matches
    /// `name` contributes, in key order, and an exact key is applied last.
    /// An undeclared target gets the default configuration.
    pub fn target(&self, name: &str) -> ProjectResult<Target> {
        let Some(targets) = self
            .document
            .lookup("project.ci.targets")
            .and_then(Value::as_map)
        else {
            return Ok(Target::default());
        };

        let mut merged = Value::empty_map();
        for (key, value) in targets {
            if key == name {
                continue;
            }
            let pattern = Regex::new(&format!("^(?:{})$", key)).map_err(|e| ProjectError::Target {
                target: key.clone(),
                message: e.to_string(),
            })?;
            if pattern.is_match(name) {
                merged = merged.unify(value.clone());
            }
        }
        if let Some(exact) = targets.get(name) {
            merged = merged.unify(exact.clone());
        }
        Ok(merged.decode()?)
    }

    /// Platforms declared for a target.
    pub fn platforms(&self, target: &str) -> ProjectResult<Vec<String>> {
        Ok(self.target(target)?.platforms)
    }

    /// Secrets for a target, global CI secrets first.
    pub fn target_secrets(&self, target: &Target) -> Vec<shipwright_core::secret::SecretRef> {
        self.global
            .ci
            .secrets
            .iter()
            .chain(target.secrets.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::project_from_kdl;

    #[test]
    fn test_target_regex_unification() {
        let project = project_from_kdl(
            r#"
            project {
                name "api"
                ci {
                    targets {
                        "test.*" privileged=#true {
                            retries attempts=2
                        }
                        test-unit {
                            platforms "linux/amd64"
                            retries attempts=5
                        }
                    }
                }
            }
            "#,
        );

        let unit = project.target("test-unit").unwrap();
        assert!(unit.privileged);
        assert_eq!(unit.retries.unwrap().attempts, 5);
        assert_eq!(unit.platforms, vec!["linux/amd64"]);

        let integration = project.target("test-integration").unwrap();
        assert!(integration.privileged);
        assert_eq!(integration.retries.unwrap().attempts, 2);

        let build = project.target("build").unwrap();
        assert_eq!(build, Target::default());
    }

    #[test]
    fn test_invalid_target_pattern() {
        let project = project_from_kdl(
            r#"project { name "api"; ci { targets { "([" privileged=#true } } }"#,
        );
        assert!(matches!(project.target("x"), Err(ProjectError::Target { .. })));
    }

    #[test]
    fn test_container_name_defaults_to_project_name() {
        let project = project_from_kdl(r#"project { name "api" }"#);
        assert_eq!(project.container_name(), "api");
        let project = project_from_kdl(r#"project { name "api"; container "api-server" }"#);
        assert_eq!(project.container_name(), "api-server");
    }

    #[test]
    fn test_branch_prefers_ci_ref() {
        let mut project = project_from_kdl(r#"project { name "api" }"#);
        project.git.branch = Some("local".into());
        assert_eq!(project.branch(), Some("local"));

        project.ci.in_ci = true;
        project.ci.branch = Some("main".into());
        assert_eq!(project.branch(), Some("main"));
        assert!(project.on_default_branch());
    }
}
