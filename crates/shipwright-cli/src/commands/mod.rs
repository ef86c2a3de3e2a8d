//! CLI command implementations.

pub mod release;
pub mod run;
pub mod scan;

use anyhow::{Context, Result};
use aws_config::SdkConfig;
use shipwright_core::executor::CommandExecutor;
use shipwright_core::secret::SecretStores;
use shipwright_core::{CancellationToken, Environment, ProcessEnv};
use shipwright_executor::{EarthlyDriver, LocalExecutor};
use shipwright_project::{Project, ProjectLoader};
use shipwright_providers::{default_stores, load_aws_config};
use shipwright_release::ReleaseError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Flags shared by every command.
pub struct Options {
    pub local: bool,
    pub workdir: Option<PathBuf>,
    pub earthly_bin: String,
}

/// Process environment, executor and loader for one invocation.
pub struct Session {
    pub env: Arc<dyn Environment>,
    pub executor: Arc<dyn CommandExecutor>,
    loader: ProjectLoader,
    local: bool,
    earthly_bin: String,
}

impl Session {
    pub fn new(opts: &Options) -> Self {
        let env: Arc<dyn Environment> = Arc::new(ProcessEnv);
        let executor: Arc<dyn CommandExecutor> = Arc::new(LocalExecutor::new());
        let mut loader = ProjectLoader::new(env.clone(), executor.clone());
        if opts.local {
            loader = loader.local();
        }
        Self {
            env,
            executor,
            loader,
            local: opts.local,
            earthly_bin: opts.earthly_bin.clone(),
        }
    }

    pub fn loader(&self) -> &ProjectLoader {
        &self.loader
    }

    pub async fn load(&self, path: &Path, cancel: &CancellationToken) -> Result<Project> {
        self.loader
            .load(path, cancel)
            .await
            .map_err(shipwright_core::Error::from)
            .with_context(|| format!("failed to load project at {}", path.display()))
    }

    /// Secret stores backed by the environment and the project's AWS account.
    pub async fn secret_stores(&self, project: &Project) -> (SecretStores, SdkConfig) {
        let region = project
            .global
            .ci
            .providers
            .aws
            .as_ref()
            .and_then(|aws| aws.region.as_deref());
        let sdk = load_aws_config(region).await;
        (default_stores(self.env.clone(), &sdk), sdk)
    }

    pub fn driver(&self, stores: SecretStores) -> EarthlyDriver {
        EarthlyDriver::new(self.executor.clone(), stores)
            .with_bin(&self.earthly_bin)
            .local(self.local)
    }
}

/// Artifact directory: the one given on the command line, or a temporary
/// directory removed on drop.
pub enum Workdir {
    Given(PathBuf),
    Temp(tempfile::TempDir),
}

impl Workdir {
    pub fn new(given: Option<&Path>) -> Result<Self> {
        match given {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create workdir {}", dir.display()))?;
                Ok(Workdir::Given(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("shipwright-")
                    .tempdir()
                    .context("failed to create temporary workdir")?;
                Ok(Workdir::Temp(dir))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Workdir::Given(dir) => dir,
            Workdir::Temp(dir) => dir.path(),
        }
    }
}

/// Exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = if let Some(e) = err.downcast_ref::<ReleaseError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<shipwright_core::Error>() {
        e.exit_code()
    } else {
        1
    };
    code as u8
}

/// Print `err` with its leading tag and return the matching exit code.
pub fn report(err: &anyhow::Error) -> ExitCode {
    let code = exit_code(err);
    let tag = if code == 4 { "fatal" } else { "error" };
    eprintln!("{}: {:#}", tag, err);
    ExitCode::from(code)
}

pub async fn validate(opts: &Options, path: &Path, cancel: &CancellationToken) -> Result<()> {
    let session = Session::new(opts);
    let project = session.load(path, cancel).await?;
    let json = project
        .document
        .to_json()
        .map_err(|e| shipwright_core::Error::Config(e.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
