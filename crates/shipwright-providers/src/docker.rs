//! Docker CLI wrapper.

use shipwright_core::executor::{CommandExecutor, CommandOutput, CommandSpec};
use shipwright_core::{CancellationToken, Error, Result, ensure_active};
use std::sync::Arc;
use tracing::info;

/// Runs `docker` against the local daemon.
pub struct DockerCli {
    executor: Arc<dyn CommandExecutor>,
    docker_bin: String,
}

impl DockerCli {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            docker_bin: "docker".to_string(),
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    async fn docker<I, S>(&self, args: I, quiet: bool, cancel: &CancellationToken) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ensure_active(cancel)?;
        let mut spec = CommandSpec::new(&self.docker_bin).args(args);
        if quiet {
            spec = spec.quiet();
        }
        self.executor.execute(spec, cancel).await
    }

    fn publish_error(action: &str, target: &str, output: &CommandOutput) -> Error {
        Error::Publish(format!(
            "docker {} {} failed: {}",
            action,
            target,
            output.combined().trim()
        ))
    }

    /// Whether the local daemon has `image`.
    pub async fn image_exists(&self, image: &str, cancel: &CancellationToken) -> Result<bool> {
        let output = self.docker(["inspect", image], true, cancel).await?;
        Ok(output.success())
    }

    pub async fn tag(&self, source: &str, target: &str, cancel: &CancellationToken) -> Result<()> {
        info!(source = %source, target = %target, "Tagging image");
        let output = self.docker(["tag", source, target], true, cancel).await?;
        if !output.success() {
            return Err(Self::publish_error("tag", target, &output));
        }
        Ok(())
    }

    pub async fn push(&self, image: &str, cancel: &CancellationToken) -> Result<()> {
        info!(image = %image, "Pushing image");
        let output = self.docker(["push", image], false, cancel).await?;
        if !output.success() {
            return Err(Self::publish_error("push", image, &output));
        }
        Ok(())
    }

    /// Push a manifest list `target` referencing already pushed `sources`.
    pub async fn create_manifest(
        &self,
        target: &str,
        sources: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(target = %target, sources = ?sources, "Creating multi-platform manifest");
        let mut args = vec![
            "buildx".to_string(),
            "imagetools".to_string(),
            "create".to_string(),
            "--tag".to_string(),
            target.to_string(),
        ];
        args.extend(sources.iter().cloned());
        let output = self.docker(args, false, cancel).await?;
        if !output.success() {
            return Err(Self::publish_error("buildx imagetools create", target, &output));
        }
        Ok(())
    }
}
