//! Earthly build driver.

use async_trait::async_trait;
use shipwright_config::schema::Target;
use shipwright_core::executor::{CommandExecutor, CommandSpec};
use shipwright_core::platform::host_platform;
use shipwright_core::secret::SecretStores;
use shipwright_core::{CancellationToken, Error};
use shipwright_project::Project;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::secrets::{earthly_secrets_env, resolve_secrets};
use crate::{BuildError, BuildResult};

/// Environment variable carrying secrets to Earthly.
pub const EARTHLY_SECRETS: &str = "EARTHLY_SECRETS";

const OUTPUT_TAIL_LINES: usize = 40;

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Arguments passed to the target before the configured target args.
    pub args: Vec<String>,
    /// Copy the target's artifacts to `<dir>/<platform>/`.
    pub artifact_dir: Option<PathBuf>,
    /// Produce no images or artifacts.
    pub no_output: bool,
}

impl BuildOptions {
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }
}

/// Runs a project's target.
#[async_trait]
pub trait BuildDriver: Send + Sync {
    async fn run_target(
        &self,
        project: &Project,
        target: &str,
        opts: &BuildOptions,
        cancel: &CancellationToken,
    ) -> BuildResult<()>;
}

/// Runs targets with the `earthly` CLI.
pub struct EarthlyDriver {
    executor: Arc<dyn CommandExecutor>,
    secrets: SecretStores,
    earthly_bin: String,
    local: bool,
}

impl EarthlyDriver {
    pub fn new(executor: Arc<dyn CommandExecutor>, secrets: SecretStores) -> Self {
        Self {
            executor,
            secrets,
            earthly_bin: "earthly".to_string(),
            local: false,
        }
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.earthly_bin = bin.into();
        self
    }

    /// Never use a remote satellite.
    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Driver arguments for one platform, not including the program.
    pub fn arguments(
        &self,
        project: &Project,
        target: &str,
        config: &Target,
        platform: &str,
        opts: &BuildOptions,
    ) -> Vec<String> {
        let mut args = Vec::new();
        let earthly = project.global.ci.providers.earthly.as_ref();

        if let Some(config_path) = earthly.and_then(|e| e.config.as_ref()) {
            args.extend(["--config".to_string(), config_path.clone()]);
        }
        if config.privileged {
            args.push("--allow-privileged".to_string());
        }
        if !self.local {
            if let Some(satellite) = earthly.and_then(|e| e.satellite.as_ref()) {
                args.extend(["--sat".to_string(), satellite.clone()]);
            }
        }
        args.extend(["--platform".to_string(), platform.to_string()]);
        if opts.no_output {
            args.push("--no-output".to_string());
        }

        let reference = format!("{}+{}", project.path.display(), target);
        match &opts.artifact_dir {
            Some(dir) => {
                let out = dir.join(platform);
                args.extend([
                    "--artifact".to_string(),
                    format!("{}/*", reference),
                    format!("{}/", out.display()),
                ]);
            }
            None => args.push(reference),
        }

        args.extend(opts.args.iter().cloned());
        for (key, value) in &config.args {
            args.extend([format!("--{}", key), value.clone()]);
        }
        args
    }
}

#[async_trait]
impl BuildDriver for EarthlyDriver {
    async fn run_target(
        &self,
        project: &Project,
        target: &str,
        opts: &BuildOptions,
        cancel: &CancellationToken,
    ) -> BuildResult<()> {
        let config = project.target(target)?;
        let secrets = resolve_secrets(&self.secrets, &project.target_secrets(&config), cancel).await?;

        let platforms = if config.platforms.is_empty() {
            vec![host_platform()]
        } else {
            config.platforms.clone()
        };
        let retries = config.retries.clone().unwrap_or_default();
        let max_attempts = retries.attempts + 1;

        let mut first_failure = None;
        for platform in &platforms {
            let mut spec = CommandSpec::new(&self.earthly_bin)
                .args(self.arguments(project, target, &config, platform, opts))
                .current_dir(&project.repo_root);
            if !secrets.is_empty() {
                spec = spec.env(EARTHLY_SECRETS, earthly_secrets_env(&secrets));
            }

            let mut attempt = 0;
            loop {
                attempt += 1;
                info!(
                    project = %project.name,
                    target = %target,
                    platform = %platform,
                    attempt,
                    max_attempts,
                    "Running target"
                );
                let output = self.executor.execute(spec.clone(), cancel).await?;
                if output.success() {
                    if attempt > 1 {
                        info!(target = %target, platform = %platform, attempt, "Target succeeded after retry");
                    }
                    break;
                }

                let combined = output.combined();
                let retryable = retries.filters.is_empty()
                    || retries.filters.iter().any(|f| combined.contains(f.as_str()));
                if attempt >= max_attempts || !retryable {
                    if !retryable {
                        info!(filters = ?retries.filters, "No retry filter matched");
                    }
                    error!(target = %target, platform = %platform, attempt, "Target failed");
                    first_failure.get_or_insert(BuildError::Failed {
                        target: target.to_string(),
                        platform: platform.clone(),
                        attempts: attempt,
                        output: tail(&combined, OUTPUT_TAIL_LINES),
                    });
                    break;
                }

                warn!(target = %target, platform = %platform, attempt, "Target failed, retrying");
                if let Some(delay) = retries.delay {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_config::{apply_default_setters, decode_blueprint, merge_documents, parse_document};
    use shipwright_core::executor::CommandOutput;
    use shipwright_core::{MapEnv, Result};
    use shipwright_project::{GitState, CiContext};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn project(source: &str) -> Project {
        let mut document = merge_documents(None, Some(parse_document(source).unwrap())).unwrap();
        apply_default_setters(&mut document).unwrap();
        let blueprint = decode_blueprint(&document).unwrap();
        let config = blueprint.project.unwrap();
        Project {
            name: config.name.clone(),
            path: PathBuf::from("/repo/app"),
            repo_root: PathBuf::from("/repo"),
            rel_path: "app".into(),
            global: blueprint.global,
            config,
            document,
            build_file: None,
            tag: None,
            git: GitState::default(),
            ci: CiContext::default(),
        }
    }

    /// Replays scripted outputs and records every command.
    #[derive(Default)]
    struct Scripted {
        outputs: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl Scripted {
        fn new(outputs: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.into()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        async fn execute(&self, spec: CommandSpec, _cancel: &CancellationToken) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec);
            Ok(self.outputs.lock().unwrap().pop_front().unwrap_or_else(CommandOutput::ok))
        }
    }

    fn driver(executor: Arc<Scripted>) -> EarthlyDriver {
        EarthlyDriver::new(executor, SecretStores::new()).with_bin("earthly")
    }

    #[test]
    fn test_argument_order() {
        let project = project(
            r#"
            global { ci { providers { earthly { satellite "sat-1"; config "/etc/earthly.yml" } } } }
            project {
                name "app"
                ci { targets { publish privileged=#true { args { version "1.2"; arch "x86" } } } }
            }
            "#,
        );
        let config = project.target("publish").unwrap();
        let opts = BuildOptions::default()
            .with_args(["--container", "app"])
            .with_artifact_dir("/out");
        let driver = driver(Scripted::new(vec![]));

        assert_eq!(
            driver.arguments(&project, "publish", &config, "linux/amd64", &opts),
            vec![
                "--config", "/etc/earthly.yml",
                "--allow-privileged",
                "--sat", "sat-1",
                "--platform", "linux/amd64",
                "--artifact", "/repo/app+publish/*", "/out/linux/amd64/",
                "--container", "app",
                "--arch", "x86",
                "--version", "1.2",
            ]
        );

        let local = driver.local(true);
        let args = local.arguments(&project, "publish", &config, "linux/amd64", &BuildOptions::default());
        assert!(!args.contains(&"--sat".to_string()));
        assert!(args.contains(&"/repo/app+publish".to_string()));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let project = project(
            r#"project { name "app"; ci { targets { build { retries attempts=2 } } } }"#,
        );
        let executor = Scripted::new(vec![
            CommandOutput::failed(1, "network error"),
            CommandOutput::ok(),
        ]);
        driver(executor.clone())
            .run_target(&project, "build", &BuildOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_filter_stops_retrying() {
        let project = project(
            r#"
            project {
                name "app"
                ci { targets { build { platforms "linux/amd64" "linux/arm64"; retries attempts=3 { filters "rate limit" } } } }
            }
            "#,
        );
        let executor = Scripted::new(vec![
            CommandOutput::failed(1, "permission denied"),
            CommandOutput::failed(1, "rate limit exceeded"),
            CommandOutput::ok(),
        ]);
        let err = driver(executor.clone())
            .run_target(&project, "build", &BuildOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        // amd64 fails fast, arm64 retries once and succeeds.
        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].args.contains(&"linux/amd64".to_string()));
        assert!(calls[2].args.contains(&"linux/arm64".to_string()));
        match err {
            BuildError::Failed { platform, attempts, output, .. } => {
                assert_eq!(platform, "linux/amd64");
                assert_eq!(attempts, 1);
                assert_eq!(output, "permission denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let project = project(
            r#"project { name "app"; ci { targets { build { retries attempts=1 } } } }"#,
        );
        let executor = Scripted::new(vec![
            CommandOutput::failed(1, "boom"),
            CommandOutput::failed(1, "boom"),
        ]);
        let err = driver(executor.clone())
            .run_target(&project, "build", &BuildOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(executor.calls().len(), 2);
        assert!(matches!(shipwright_core::Error::from(err), Error::Build(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_delay() {
        let project = project(
            r#"project { name "app"; ci { targets { build { retries attempts=1 delay="30s" } } } }"#,
        );
        let executor = Scripted::new(vec![CommandOutput::failed(1, "flaky"), CommandOutput::ok()]);
        let start = tokio::time::Instant::now();
        driver(executor.clone())
            .run_target(&project, "build", &BuildOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.calls().len(), 2);
        assert!(start.elapsed() >= std::time::Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_delay() {
        let project = project(
            r#"project { name "app"; ci { targets { build { retries attempts=3 delay="1h" } } } }"#,
        );
        let executor = Scripted::new(vec![CommandOutput::failed(1, "flaky")]);
        let driver = driver(executor.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let start = tokio::time::Instant::now();
        let options = BuildOptions::default();

        let (result, _) = tokio::join!(
            driver.run_target(&project, "build", &options, &cancel),
            async move {
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                trigger.cancel();
            },
        );
        let err = result.unwrap_err();
        assert!(matches!(shipwright_core::Error::from(err), Error::Cancelled));
        assert_eq!(executor.calls().len(), 1);
        assert!(start.elapsed() < std::time::Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_secrets_reach_child_environment() {
        let project = project(
            r#"
            global { ci { secrets { - provider="env" path="GLOBAL_TOKEN" name="global" } } }
            project {
                name "app"
                ci { targets { build { secrets { - provider="env" path="BUILD_TOKEN" name="build" } } } }
            }
            "#,
        );
        let env = Arc::new(MapEnv::new().with("GLOBAL_TOKEN", "g").with("BUILD_TOKEN", "b"));
        let stores = SecretStores::new().with("env", Arc::new(EnvStore(env)));
        let executor = Scripted::new(vec![]);
        EarthlyDriver::new(executor.clone(), stores)
            .run_target(&project, "build", &BuildOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executor.calls()[0].env[EARTHLY_SECRETS], "global=g,build=b");
    }

    struct EnvStore(Arc<MapEnv>);

    #[async_trait]
    impl shipwright_core::secret::SecretStore for EnvStore {
        async fn get(&self, path: &str) -> Result<String> {
            use shipwright_core::Environment;
            self.0
                .var(path)
                .ok_or_else(|| Error::Environment(format!("{} not set", path)))
        }
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}
