//! Container images.
//!
//! The release target is run with `--container container --tag tag`, which
//! leaves `container:tag` (or `container:tag_<platform>` per platform) in the
//! local daemon. Those images are retagged for every configured registry and
//! pushed; multi-platform images are joined under one manifest list.

use async_trait::async_trait;
use serde::Deserialize;
use shipwright_core::platform::tag_suffix;
use shipwright_core::{CancellationToken, Error, Result, ensure_active};
use shipwright_executor::BuildOptions;
use shipwright_project::Project;
use tracing::info;

use super::{ReleaseProvider, ensure_managed_repository};
use crate::context::ReleaseContext;

/// Image name the build is asked to produce.
pub const CONTAINER_SENTINEL: &str = "container";
/// Image tag the build is asked to produce.
pub const TAG_SENTINEL: &str = "tag";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerConfig {
    /// Image tag used when the project has no git tag.
    pub tag: Option<String>,
}

pub struct ContainerRelease {
    config: ContainerConfig,
}

impl ContainerRelease {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    fn image_tag(&self, project: &Project) -> Result<String> {
        if let Some(tag) = project.tag.as_ref().filter(|_| project.tag_matches()) {
            return Ok(tag.version.clone());
        }
        self.config
            .tag
            .clone()
            .ok_or_else(|| Error::Config("no git tag found and no fallback tag configured".to_string()))
    }
}

fn sentinel_image(platform: Option<&str>) -> String {
    match platform {
        Some(platform) => format!("{}:{}_{}", CONTAINER_SENTINEL, TAG_SENTINEL, tag_suffix(platform)),
        None => format!("{}:{}", CONTAINER_SENTINEL, TAG_SENTINEL),
    }
}

#[async_trait]
impl ReleaseProvider for ContainerRelease {
    fn build_options(&self, _ctx: &ReleaseContext) -> Option<BuildOptions> {
        Some(BuildOptions::default().with_args([
            "--container",
            CONTAINER_SENTINEL,
            "--tag",
            TAG_SENTINEL,
        ]))
    }

    async fn publish(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let tag = self.image_tag(project)?;
        let image = project.container_name();
        let platforms = project.platforms(target)?;
        let multi = platforms.len() > 1;
        let docker = ctx.docker();

        let local_images: Vec<String> = if multi {
            platforms.iter().map(|p| sentinel_image(Some(p))).collect()
        } else {
            vec![sentinel_image(None)]
        };
        for local in &local_images {
            info!(image = %local, "Validating image exists");
            if !docker.image_exists(local, cancel).await? {
                return Err(Error::Validation(format!("image {} does not exist", local)));
            }
        }

        let registries = &project.global.ci.registries;
        if registries.is_empty() {
            return Err(Error::Config("must specify at least one container registry".to_string()));
        }

        for registry in registries {
            let container = format!("{}/{}", registry.trim_end_matches('/'), image);
            ensure_managed_repository(ctx, project, &container, cancel).await?;

            let published = format!("{}:{}", container, tag);
            if multi {
                let mut pushed = Vec::with_capacity(platforms.len());
                for (platform, local) in platforms.iter().zip(&local_images) {
                    let platform_image = format!("{}_{}", published, tag_suffix(platform));
                    docker.tag(local, &platform_image, cancel).await?;
                    docker.push(&platform_image, cancel).await?;
                    pushed.push(platform_image);
                }
                docker.create_manifest(&published, &pushed, cancel).await?;
            } else {
                docker.tag(&local_images[0], &published, cancel).await?;
                docker.push(&published, cancel).await?;
            }
            info!(project = %project.name, image = %published, "Published image");
        }
        Ok(())
    }
}
