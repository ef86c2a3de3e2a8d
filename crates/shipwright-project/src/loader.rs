//! Project loading.
//!
//! Loading a project resolves its blueprint in a fixed order:
//!
//! 1. find the repository root
//! 2. merge schema defaults, the root blueprint and the project blueprint
//! 3. apply default setters
//! 4. inject `env`, then `global` attributes
//! 5. read git state and select the project's tag
//! 6. inject `runtime` attributes
//! 7. parse the Earthfile and decode the typed blueprint

use shipwright_config::{
    EnvInjector, GlobalInjector, RuntimeInjector, Value, apply_default_setters, decode_blueprint,
    inject, merge_documents, read_blueprint,
};
use shipwright_core::executor::CommandExecutor;
use shipwright_core::{CancellationToken, Environment};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::buildfile::BuildFile;
use crate::ci::CiContext;
use crate::git::{GitRepo, find_repo_root};
use crate::project::Project;
use crate::runtime::{STRATEGY_COMMIT, runtime_data};
use crate::tag::{ProjectTag, select_tag};
use crate::{ProjectError, ProjectResult};

/// Loads projects against one environment and command executor.
pub struct ProjectLoader {
    env: Arc<dyn Environment>,
    executor: Arc<dyn CommandExecutor>,
    ci: CiContext,
}

impl ProjectLoader {
    pub fn new(env: Arc<dyn Environment>, executor: Arc<dyn CommandExecutor>) -> Self {
        let ci = CiContext::from_env(env.as_ref());
        Self { env, executor, ci }
    }

    /// Ignore the CI environment, as for a run on a developer machine.
    pub fn local(mut self) -> Self {
        self.ci = CiContext::local();
        self
    }

    pub fn ci(&self) -> &CiContext {
        &self.ci
    }

    pub async fn load(&self, path: &Path, cancel: &CancellationToken) -> ProjectResult<Project> {
        let repo_root = find_repo_root(path)?;
        let path = path.canonicalize()?;
        let rel_path = relative_path(&repo_root, &path);
        debug!(path = %path.display(), repo_root = %repo_root.display(), "Loading project");

        let root_doc = if path == repo_root {
            None
        } else {
            read_blueprint(&repo_root)?
        };
        let project_doc = read_blueprint(&path)?;
        let mut doc = merge_documents(root_doc, project_doc)?;
        if doc.lookup("project").is_none() {
            return Err(ProjectError::NoBlueprint(path));
        }

        apply_default_setters(&mut doc)?;
        inject(&mut doc, &EnvInjector::new(self.env.as_ref()))?;
        inject(&mut doc, &GlobalInjector)?;

        let git_bin = self.env.non_empty("SHIPWRIGHT_GIT_BIN").unwrap_or_else(|| "git".to_string());
        let git = GitRepo::open(&repo_root, self.executor.clone())
            .with_bin(git_bin)
            .state(cancel)
            .await?;
        let aliases = string_map(&doc, "global.ci.tagging.aliases");
        let tag = match (&self.ci.in_ci, &self.ci.tag) {
            (true, Some(tag)) => ProjectTag::parse(tag),
            _ => select_tag(git.tags.iter().map(String::as_str), &rel_path, &aliases),
        };

        // Runtime data only sees a tag that selects this project.
        let name = doc.lookup("project.name").and_then(Value::as_str).unwrap_or_default();
        let project_tag = tag
            .as_ref()
            .filter(|t| t.matches_project(name, &rel_path, &aliases));
        let strategy = doc
            .lookup("global.ci.tagging.strategy")
            .and_then(Value::as_str)
            .unwrap_or(STRATEGY_COMMIT);
        let runtime = runtime_data(&git.commit, strategy, project_tag)?;
        inject(&mut doc, &RuntimeInjector::new(&runtime))?;

        let build_file = BuildFile::read(&path)?;
        let blueprint = decode_blueprint(&doc)?;
        let Some(config) = blueprint.project else {
            return Err(ProjectError::NoBlueprint(path));
        };

        info!(
            project = %config.name,
            path = %rel_path,
            tag = ?tag.as_ref().map(|t| t.full.as_str()),
            "Loaded project"
        );

        Ok(Project {
            name: config.name.clone(),
            path,
            repo_root,
            rel_path,
            global: blueprint.global,
            config,
            document: doc,
            build_file,
            tag,
            git,
            ci: self.ci.clone(),
        })
    }
}

/// `path` relative to `root` with `/` separators, `.` for the root itself.
pub fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => PathBuf::from(path).display().to_string(),
    }
}

fn string_map(doc: &Value, path: &str) -> BTreeMap<String, String> {
    doc.lookup(path)
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
