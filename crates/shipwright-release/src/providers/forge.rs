//! Archives attached to a release on the source forge.

use async_trait::async_trait;
use serde::Deserialize;
use shipwright_core::platform::{file_slug, host_platform};
use shipwright_core::{CancellationToken, Error, Result};
use shipwright_executor::BuildOptions;
use shipwright_project::Project;
use shipwright_providers::NewRelease;
use std::path::PathBuf;
use tracing::info;

use super::brew::{BrewConfig, publish_formula};
use super::{ReleaseProvider, require_output_dir};
use crate::archive::archive_dir;
use crate::context::{ReleaseContext, cancellable, ensure_active};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForgeReleaseConfig {
    /// Archive name prefix. Defaults to the project name.
    pub prefix: Option<String>,
    /// Release title. Defaults to the tag.
    pub name: Option<String>,
    /// Also publish a Homebrew formula for the archives.
    pub brew: Option<BrewConfig>,
}

pub struct ForgeRelease {
    config: ForgeReleaseConfig,
}

impl ForgeRelease {
    pub fn new(config: ForgeReleaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReleaseProvider for ForgeRelease {
    fn build_options(&self, ctx: &ReleaseContext) -> Option<BuildOptions> {
        Some(BuildOptions::default().with_artifact_dir(ctx.workdir()))
    }

    async fn publish(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let tag = project
            .tag
            .as_ref()
            .filter(|_| project.tag_matches())
            .ok_or_else(|| Error::Config("forge releases require a git tag for the project".to_string()))?;

        let mut platforms = project.platforms(target)?;
        if platforms.is_empty() {
            platforms.push(host_platform());
        }

        for platform in &platforms {
            info!(platform = %platform, "Validating artifacts");
            require_output_dir(&ctx.workdir().join(platform)).await?;
        }

        let prefix = self.config.prefix.as_deref().unwrap_or(&project.name);
        let mut archives: Vec<(String, PathBuf)> = Vec::with_capacity(platforms.len());
        for platform in &platforms {
            let filename = format!("{}-{}.tar.gz", prefix, file_slug(platform));
            let src = ctx.workdir().join(platform);
            let dest = ctx.workdir().join(&filename);
            info!(src = %src.display(), filename = %filename, "Creating archive");
            tokio::task::spawn_blocking(move || archive_dir(&src, &dest))
                .await
                .map_err(|e| Error::Publish(format!("archive task failed: {}", e)))?
                .map_err(|e| Error::Publish(format!("failed to archive {}: {}", filename, e)))?;
            archives.push((filename.clone(), ctx.workdir().join(&filename)));
        }

        let forge = ctx.forge()?;
        let release = match cancellable(cancel, forge.get_release_by_tag(&tag.full)).await? {
            Some(release) => {
                info!(tag = %tag.full, id = release.id, "Found existing release");
                release
            }
            None => {
                let name = self.config.name.clone().unwrap_or_else(|| tag.full.clone());
                let new = NewRelease {
                    tag_name: tag.full.clone(),
                    name,
                    draft: false,
                    prerelease: false,
                };
                cancellable(cancel, forge.create_release(&new)).await?
            }
        };

        for (filename, path) in archives {
            if release.has_asset(&filename) {
                info!(asset = %filename, "Asset already exists, skipping");
                continue;
            }
            let body = tokio::fs::read(&path)
                .await
                .map_err(|e| Error::Publish(format!("failed to read {}: {}", path.display(), e)))?;
            cancellable(cancel, forge.upload_release_asset(&release, &filename, body)).await?;
        }

        if let Some(brew) = &self.config.brew {
            publish_formula(ctx, project, tag, brew, prefix, &platforms, cancel).await?;
        }
        info!(project = %project.name, tag = %tag.full, "Forge release complete");
        Ok(())
    }
}
