//! `shipwright release`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use shipwright_core::secret::{SecretRef, SecretStores};
use shipwright_core::CancellationToken;
use shipwright_project::Project;
use shipwright_providers::github::resolve_token;
use shipwright_providers::{
    EcrProvisioner, ForgeClient, ForgeError, ForgeRelease, ForgeResult, GitHubClient, NewRelease,
    PrComment, ReleaseAsset, S3Store,
};
use shipwright_release::{ReleaseContext, ReleaseDispatcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{Options, Session, Workdir};

pub async fn release(
    opts: &Options,
    path: &Path,
    name: &str,
    force: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let session = Session::new(opts);
    let project = session
        .load(path, cancel)
        .await
        .with_context(|| format!("release {}", name))?;
    let (stores, sdk) = session.secret_stores(&project).await;
    let workdir = Workdir::new(opts.workdir.as_deref())?;
    debug!(workdir = %workdir.path().display(), "Using artifact directory");

    let mut ctx = ReleaseContext::new(
        Arc::new(session.driver(stores.clone())),
        session.executor.clone(),
        Arc::new(EcrProvisioner::new(&sdk)),
        Arc::new(S3Store::new(&sdk)),
        workdir.path(),
    );
    if let Some(forge) = LazyGitHub::for_project(&project, stores) {
        ctx = ctx.with_forge(Arc::new(forge));
    }

    let state = ReleaseDispatcher::new(ctx)
        .release(&project, name, force, cancel)
        .await?;
    println!("{}/{}: {}", project.name, name, state);
    Ok(())
}

/// GitHub client whose token is resolved on first use, so releases that
/// never reach the forge never read its credentials.
struct LazyGitHub {
    repository: String,
    ci_token: Option<String>,
    credentials: Option<SecretRef>,
    stores: SecretStores,
    client: OnceCell<GitHubClient>,
}

impl LazyGitHub {
    /// `None` when neither the blueprint nor CI names a repository.
    fn for_project(project: &Project, stores: SecretStores) -> Option<Self> {
        let repository = Some(project.global.repo.name.clone())
            .filter(|name| !name.is_empty())
            .or_else(|| project.ci.repository.clone())?;
        let credentials = project
            .global
            .ci
            .providers
            .github
            .as_ref()
            .and_then(|github| github.credentials.clone());
        Some(Self {
            repository,
            ci_token: project.ci.token.clone(),
            credentials,
            stores,
            client: OnceCell::new(),
        })
    }

    async fn client(&self) -> ForgeResult<&GitHubClient> {
        self.client
            .get_or_try_init(|| async {
                let token = resolve_token(
                    self.ci_token.as_deref(),
                    self.credentials.as_ref(),
                    &self.stores,
                )
                .await
                .map_err(|e| ForgeError::Token(e.to_string()))?;
                if token.is_none() {
                    debug!("No GitHub token found, using anonymous access");
                }
                GitHubClient::new(&self.repository, token)
            })
            .await
    }
}

#[async_trait]
impl ForgeClient for LazyGitHub {
    async fn get_release_by_tag(&self, tag: &str) -> ForgeResult<Option<ForgeRelease>> {
        self.client().await?.get_release_by_tag(tag).await
    }

    async fn create_release(&self, release: &NewRelease) -> ForgeResult<ForgeRelease> {
        self.client().await?.create_release(release).await
    }

    async fn upload_release_asset(
        &self,
        release: &ForgeRelease,
        name: &str,
        body: Vec<u8>,
    ) -> ForgeResult<ReleaseAsset> {
        self.client()
            .await?
            .upload_release_asset(release, name, body)
            .await
    }

    async fn list_pr_comments(&self, pr: u64) -> ForgeResult<Vec<PrComment>> {
        self.client().await?.list_pr_comments(pr).await
    }

    async fn post_pr_comment(&self, pr: u64, body: &str) -> ForgeResult<()> {
        self.client().await?.post_pr_comment(pr, body).await
    }

    async fn list_branches(&self) -> ForgeResult<Vec<String>> {
        self.client().await?.list_branches().await
    }

    async fn git_token(&self) -> ForgeResult<Option<String>> {
        self.client().await?.git_token().await
    }
}
