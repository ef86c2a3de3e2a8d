//! Static documentation mirrored to an object store bucket.
//!
//! The default branch publishes to `<path>/<name>`; any other branch to
//! `<path>/<name>/b/<branch>`, with a preview link posted on the pull request
//! when running in CI.
//!
//! Before uploading, stale keys under the target prefix are deleted unless
//! they match a configured `exclude` regex. On the default branch the
//! `<path>/<name>/b/` previews sit under the target prefix, so they are
//! always excluded from that sweep and only removed by branch reaping.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use shipwright_config::schema::DocsConfig;
use shipwright_core::platform::host_platform;
use shipwright_core::{CancellationToken, Error, Result};
use shipwright_executor::BuildOptions;
use shipwright_project::Project;
use shipwright_providers::s3::{delete_prefix, join_key, list_immediate_children, upload_directory};
use tracing::{info, warn};

use super::{ReleaseProvider, require_output_dir};
use crate::context::{ReleaseContext, cancellable, ensure_active};

/// First line of the preview comment, used to find earlier comments.
pub const DOCS_COMMENT_SENTINEL: &str = "<!-- forge:v1:docs-preview -->";

/// Pull request comment linking to a docs preview.
pub fn docs_comment_body(url: &str) -> String {
    format!(
        "{}\n## 📚 Docs Preview\n\nThe docs for this PR can be previewed at the following URL:\n\n{}\n",
        DOCS_COMMENT_SENTINEL, url
    )
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocsReleaseConfig {
    /// Name used in the bucket path. Defaults to the project name.
    pub name: Option<String>,
}

pub struct DocsRelease {
    config: DocsReleaseConfig,
}

impl DocsRelease {
    pub fn new(config: DocsReleaseConfig) -> Self {
        Self { config }
    }

    /// Key prefix of the default-branch docs, `<path>/<name>`.
    fn base_prefix(docs: &DocsConfig, name: &str) -> String {
        join_key(docs.path.as_deref().unwrap_or_default(), name)
    }

    async fn post_preview_comment(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        docs: &DocsConfig,
        name: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(pr) = project.ci.pr_number else {
            warn!("No pull request number found, skipping comment");
            return Ok(());
        };
        let base_url = docs
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("global.ci.release.docs.url is required for previews".to_string()))?;

        let forge = ctx.forge()?;
        let comments = cancellable(cancel, forge.list_pr_comments(pr)).await?;
        if comments
            .iter()
            .any(|c| c.body.trim_start().starts_with(DOCS_COMMENT_SENTINEL))
        {
            info!(pr, "Found existing preview comment, skipping");
            return Ok(());
        }

        let url = format!("{}/{}/b/{}", base_url.trim_end_matches('/'), name, branch);
        info!(pr, url = %url, "Posting preview comment");
        cancellable(cancel, forge.post_pr_comment(pr, &docs_comment_body(&url))).await?;
        Ok(())
    }

    /// Delete branch previews whose branch no longer exists.
    async fn reap_branches(
        &self,
        ctx: &ReleaseContext,
        bucket: &str,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let branches = cancellable(cancel, ctx.forge()?.list_branches()).await?;
        let previews = join_key(base, "b/");
        let children = cancellable(
            cancel,
            list_immediate_children(ctx.objects.as_ref(), bucket, &previews),
        )
        .await?;

        for child in children {
            let live = branches
                .iter()
                .any(|b| *b == child || b.starts_with(&format!("{}/", child)));
            if live {
                continue;
            }
            info!(branch = %child, "Deleting docs for removed branch");
            let prefix = format!("{}/", join_key(&previews, &child));
            cancellable(cancel, delete_prefix(ctx.objects.as_ref(), bucket, &prefix, &[])).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseProvider for DocsRelease {
    fn build_options(&self, ctx: &ReleaseContext) -> Option<BuildOptions> {
        Some(BuildOptions::default().with_artifact_dir(ctx.workdir()))
    }

    async fn publish(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        _target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let docs = project
            .global
            .ci
            .release
            .docs
            .as_ref()
            .ok_or_else(|| Error::Config("global docs release configuration not found".to_string()))?;
        if docs.bucket.is_empty() {
            return Err(Error::Config("no bucket specified in global docs configuration".to_string()));
        }
        let name = self.config.name.as_deref().unwrap_or(&project.name);
        let branch = project
            .branch()
            .ok_or_else(|| Error::Environment("unable to determine the current branch".to_string()))?;
        let on_default = project.on_default_branch();

        let output = ctx.workdir().join(host_platform());
        require_output_dir(&output).await?;

        let base = Self::base_prefix(docs, name);
        let prefix = if on_default {
            base.clone()
        } else {
            join_key(&base, &format!("b/{}", branch))
        };

        let mut exclude = docs
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| Error::Config(format!("invalid docs exclude {}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        if on_default {
            let previews = format!("^{}/", regex::escape(&join_key(&base, "b")));
            exclude.push(Regex::new(&previews).map_err(|e| Error::Config(e.to_string()))?);
        }

        info!(bucket = %docs.bucket, prefix = %prefix, "Cleaning existing docs");
        let stale = format!("{}/", prefix);
        cancellable(
            cancel,
            delete_prefix(ctx.objects.as_ref(), &docs.bucket, &stale, &exclude),
        )
        .await?;

        info!(bucket = %docs.bucket, prefix = %prefix, "Uploading docs");
        cancellable(
            cancel,
            upload_directory(ctx.objects.as_ref(), &docs.bucket, &prefix, &output),
        )
        .await?;

        if project.ci.in_ci && project.ci.is_pr {
            self.post_preview_comment(ctx, project, docs, name, branch, cancel)
                .await?;
        }

        if docs.reap_branches && on_default {
            info!(bucket = %docs.bucket, "Cleaning up docs for removed branches");
            self.reap_branches(ctx, &docs.bucket, &base, cancel).await?;
        }

        info!(project = %project.name, "Docs release complete");
        Ok(())
    }
}
