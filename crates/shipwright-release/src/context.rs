//! Collaborators shared by every release provider.

use shipwright_core::executor::CommandExecutor;
pub use shipwright_core::{cancellable, ensure_active};
use shipwright_core::{Environment, Error, ProcessEnv, Result};
use shipwright_executor::BuildDriver;
use shipwright_providers::{DockerCli, ForgeClient, ForgeError, ObjectStore, RegistryProvisioner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// External systems a release talks to.
pub struct ReleaseContext {
    pub driver: Arc<dyn BuildDriver>,
    pub executor: Arc<dyn CommandExecutor>,
    pub registry: Arc<dyn RegistryProvisioner>,
    pub objects: Arc<dyn ObjectStore>,
    forge: Option<Arc<dyn ForgeClient>>,
    env: Arc<dyn Environment>,
    workdir: PathBuf,
}

impl ReleaseContext {
    pub fn new(
        driver: Arc<dyn BuildDriver>,
        executor: Arc<dyn CommandExecutor>,
        registry: Arc<dyn RegistryProvisioner>,
        objects: Arc<dyn ObjectStore>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            driver,
            executor,
            registry,
            objects,
            forge: None,
            env: Arc::new(ProcessEnv),
            workdir: workdir.into(),
        }
    }

    pub fn with_forge(mut self, forge: Arc<dyn ForgeClient>) -> Self {
        self.forge = Some(forge);
        self
    }

    pub fn with_env(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    /// Name of an external packaging tool, overridable as `SHIPWRIGHT_<NAME>_BIN`.
    pub fn tool_bin(&self, name: &str) -> String {
        self.env
            .non_empty(&format!("SHIPWRIGHT_{}_BIN", name.to_ascii_uppercase()))
            .unwrap_or_else(|| name.to_string())
    }

    /// Directory the build driver writes artifacts to, one subdirectory per platform.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn forge(&self) -> Result<&dyn ForgeClient> {
        self.forge
            .as_deref()
            .ok_or_else(|| Error::from(ForgeError::NoRepository))
    }

    pub fn docker(&self) -> DockerCli {
        DockerCli::new(self.executor.clone()).with_bin(self.tool_bin("docker"))
    }
}
