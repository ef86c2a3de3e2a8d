//! Release providers, one per release type.

mod brew;
mod container;
mod docs;
mod forge;
mod oci;

pub use brew::{BrewConfig, TapConfig};
pub use container::{CONTAINER_SENTINEL, ContainerConfig, ContainerRelease, TAG_SENTINEL};
pub use docs::{DOCS_COMMENT_SENTINEL, DocsRelease, DocsReleaseConfig, docs_comment_body};
pub use forge::{ForgeRelease, ForgeReleaseConfig};
pub use oci::{ModuleTool, OciModuleConfig, OciModuleRelease, module_container};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shipwright_config::schema::Release;
use shipwright_core::{CancellationToken, Error, Result, cancellable, ensure_active};
use shipwright_executor::BuildOptions;
use shipwright_project::Project;
use shipwright_providers::ecr::{self, RepositoryTags};
use std::path::Path;
use tracing::info;

use crate::context::ReleaseContext;

/// Publishes a release's outputs.
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    /// Options for the build run before publishing, or `None` if the
    /// provider packages sources directly.
    fn build_options(&self, ctx: &ReleaseContext) -> Option<BuildOptions>;

    /// Validate the build outputs and publish them.
    async fn publish(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Select the provider for a release and decode its configuration.
///
/// The release type defaults to the release name.
pub fn resolve_provider(name: &str, release: &Release) -> Result<Box<dyn ReleaseProvider>> {
    let kind = release.kind.as_deref().unwrap_or(name);
    let provider: Box<dyn ReleaseProvider> = match kind {
        "container" | "docker" => Box::new(ContainerRelease::new(decode(name, release)?)),
        "oci-module-kcl" | "kcl" => Box::new(OciModuleRelease::new(ModuleTool::Kcl, decode(name, release)?)),
        "oci-module-timoni" | "timoni" => {
            Box::new(OciModuleRelease::new(ModuleTool::Timoni, decode(name, release)?))
        }
        "oci-module-cue" | "cue-mod" | "cue" => {
            Box::new(OciModuleRelease::new(ModuleTool::Cue, decode(name, release)?))
        }
        "oci-module" => {
            let config: OciModuleConfig = decode(name, release)?;
            let tool = config
                .kind
                .as_deref()
                .ok_or_else(|| Error::Config(format!("release {}: oci-module requires config.kind", name)))
                .and_then(|k| {
                    ModuleTool::parse(k).ok_or_else(|| {
                        Error::Config(format!("release {}: unknown module kind: {}", name, k))
                    })
                })?;
            Box::new(OciModuleRelease::new(tool, config))
        }
        "forge-release" | "github" => Box::new(ForgeRelease::new(decode(name, release)?)),
        "docs" => Box::new(DocsRelease::new(decode(name, release)?)),
        other => {
            return Err(Error::Config(format!(
                "release {}: unknown release type: {}",
                name, other
            )));
        }
    };
    Ok(provider)
}

fn decode<T: DeserializeOwned + Default>(name: &str, release: &Release) -> Result<T> {
    release
        .decode_config()
        .map_err(|e| Error::Config(format!("release {}: invalid config: {}", name, e)))
}

/// Fail unless `dir` exists and has at least one entry.
pub(crate) async fn require_output_dir(dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| Error::Validation(format!("unable to find output folder: {}", dir.display())))?;
    let first = entries
        .next_entry()
        .await
        .map_err(|e| Error::Validation(format!("failed to read {}: {}", dir.display(), e)))?;
    if first.is_none() {
        return Err(Error::Validation(format!("no artifacts found in {}", dir.display())));
    }
    Ok(())
}

/// Create the backing repository when `container` lives in a managed registry.
pub(crate) async fn ensure_managed_repository(
    ctx: &ReleaseContext,
    project: &Project,
    container: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    if !ecr::is_managed_registry(container) {
        return Ok(());
    }
    ensure_active(cancel)?;
    info!(repository = %container, "Detected managed registry, checking repository");
    let tags = RepositoryTags {
        repo: project.global.repo.name.clone(),
        repo_path: project.rel_path.clone(),
    };
    cancellable(cancel, ecr::ensure_repository(ctx.registry.as_ref(), container, &tags)).await
}
