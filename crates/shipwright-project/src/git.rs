//! Git repository helpers.

use shipwright_core::CancellationToken;
use shipwright_core::executor::{CommandExecutor, CommandSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::{ProjectError, ProjectResult};

/// Walk up from `start` to the first directory containing `.git`.
pub fn find_repo_root(start: &Path) -> ProjectResult<PathBuf> {
    let start = start
        .canonicalize()
        .map_err(|_| ProjectError::GitDiscovery(start.to_path_buf()))?;
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| ProjectError::GitDiscovery(start.clone()))
}

/// HEAD state captured when a project is loaded.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct GitState {
    pub commit: String,
    /// `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Annotated tags pointing at HEAD.
    pub tags: Vec<String>,
}

/// Runs `git` in a repository.
pub struct GitRepo {
    root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    git_bin: String,
}

impl GitRepo {
    pub fn open(root: impl Into<PathBuf>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            root: root.into(),
            executor,
            git_bin: "git".to_string(),
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.git_bin = bin.into();
        self
    }

    async fn git(&self, args: &[&str], cancel: &CancellationToken) -> ProjectResult<String> {
        let spec = CommandSpec::new(&self.git_bin)
            .args(args.iter().copied())
            .current_dir(&self.root)
            .quiet();
        let output = self.executor.execute(spec, cancel).await?;
        if !output.success() {
            return Err(ProjectError::Git {
                command: args.join(" "),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    pub async fn head_commit(&self, cancel: &CancellationToken) -> ProjectResult<String> {
        self.git(&["rev-parse", "HEAD"], cancel).await
    }

    pub async fn current_branch(&self, cancel: &CancellationToken) -> ProjectResult<Option<String>> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"], cancel).await?;
        Ok((branch != "HEAD" && !branch.is_empty()).then_some(branch))
    }

    /// Annotated tags pointing at HEAD. Lightweight tags are ignored.
    pub async fn annotated_tags_at_head(&self, cancel: &CancellationToken) -> ProjectResult<Vec<String>> {
        let out = self
            .git(
                &[
                    "for-each-ref",
                    "--points-at",
                    "HEAD",
                    "--format=%(objecttype) %(refname:short)",
                    "refs/tags",
                ],
                cancel,
            )
            .await?;
        Ok(out
            .lines()
            .filter_map(|line| line.split_once(' '))
            .filter(|(kind, _)| *kind == "tag")
            .map(|(_, name)| name.to_string())
            .collect())
    }

    pub async fn state(&self, cancel: &CancellationToken) -> ProjectResult<GitState> {
        let commit = self.head_commit(cancel).await?;
        let branch = self.current_branch(cancel).await?;
        let tags = self.annotated_tags_at_head(cancel).await?;
        debug!(commit = %commit, branch = ?branch, tags = ?tags, "Read git state");
        Ok(GitState {
            commit,
            branch,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGit;

    #[test]
    fn test_find_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("services/api");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(matches!(find_repo_root(&nested), Err(ProjectError::GitDiscovery(_))));

        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let root = find_repo_root(&nested).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_state_filters_lightweight_tags() {
        let fake = FakeGit::new("abc123", "main").with_tag_line("tag app/v1.0.0").with_tag_line("commit light");
        let repo = GitRepo::open("/repo", Arc::new(fake));
        let state = repo.state(&CancellationToken::new()).await.unwrap();
        assert_eq!(state.commit, "abc123");
        assert_eq!(state.branch.as_deref(), Some("main"));
        assert_eq!(state.tags, vec!["app/v1.0.0"]);
    }

    #[tokio::test]
    async fn test_detached_head_has_no_branch() {
        let repo = GitRepo::open("/repo", Arc::new(FakeGit::new("abc123", "HEAD")));
        assert!(repo.current_branch(&CancellationToken::new()).await.unwrap().is_none());
    }
}
