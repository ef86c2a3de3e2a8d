//! OCI modules published with the KCL, Timoni or CUE CLIs.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use shipwright_core::executor::{CommandOutput, CommandSpec};
use shipwright_core::{CancellationToken, Error, Result, ensure_active};
use shipwright_executor::BuildOptions;
use shipwright_project::Project;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{error, info};

use super::{ReleaseProvider, ensure_managed_repository};
use crate::context::ReleaseContext;

static CUE_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*module:\s*"([^"]+)""#).expect("valid module regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleTool {
    Kcl,
    Timoni,
    Cue,
}

impl ModuleTool {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "kcl" => Some(ModuleTool::Kcl),
            "timoni" => Some(ModuleTool::Timoni),
            "cue" => Some(ModuleTool::Cue),
            _ => None,
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            ModuleTool::Kcl => "kcl",
            ModuleTool::Timoni => "timoni",
            ModuleTool::Cue => "cue",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OciModuleConfig {
    /// Module name in the registry. Defaults to the project name.
    pub container: Option<String>,
    /// Version used when the project has no git tag.
    pub tag: Option<String>,
    /// Tool for the generic `oci-module` type: `kcl`, `timoni` or `cue`.
    pub kind: Option<String>,
}

/// `<registry>/[<repo>/]<name>`. The repository segment is omitted for
/// `ghcr.io` registries, which are already scoped to an owner.
pub fn module_container(project: &Project, name: &str, registry: &str) -> String {
    let registry = registry.trim_end_matches('/');
    if registry.starts_with("ghcr.io") || project.global.repo.name.is_empty() {
        format!("{}/{}", registry, name)
    } else {
        format!("{}/{}/{}", registry, project.global.repo.short_name(), name)
    }
}

pub struct OciModuleRelease {
    tool: ModuleTool,
    config: OciModuleConfig,
}

impl OciModuleRelease {
    pub fn new(tool: ModuleTool, config: OciModuleConfig) -> Self {
        Self { tool, config }
    }

    /// Version with a leading `v`: the project's git tag, else `config.tag`.
    fn version(&self, project: &Project) -> Result<String> {
        let version = project
            .tag
            .as_ref()
            .filter(|_| project.tag_matches())
            .map(|t| t.version.clone())
            .or_else(|| self.config.tag.clone())
            .ok_or_else(|| Error::Config("no git tag found and no fallback tag configured".to_string()))?;
        Ok(if version.starts_with('v') {
            version
        } else {
            format!("v{}", version)
        })
    }

    fn module_name<'a>(&'a self, project: &'a Project) -> &'a str {
        self.config.container.as_deref().unwrap_or(&project.name)
    }

    async fn run(
        &self,
        ctx: &ReleaseContext,
        spec: CommandSpec,
        module: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        info!(command = %spec, "Publishing module");
        let output: CommandOutput = ctx.executor.execute(spec, cancel).await?;
        if !output.success() {
            error!(module = %module, output = %output.combined(), "Failed to push module");
            return Err(Error::Publish(format!(
                "failed to push module {}: {}",
                module,
                output.combined().trim()
            )));
        }
        Ok(())
    }

    async fn publish_kcl(&self, ctx: &ReleaseContext, project: &Project, cancel: &CancellationToken) -> Result<()> {
        let registries = project
            .global
            .ci
            .providers
            .kcl
            .as_ref()
            .map(|k| k.registries.as_slice())
            .unwrap_or_default();
        if registries.is_empty() {
            return Err(Error::Config("must specify at least one KCL registry".to_string()));
        }

        for registry in registries {
            let container = module_container(project, self.module_name(project), registry);
            ensure_managed_repository(ctx, project, &container, cancel).await?;
            let spec = CommandSpec::new(ctx.tool_bin("kcl"))
                .args(["mod", "push"])
                .arg(format!("oci://{}", container))
                .current_dir(&project.path);
            self.run(ctx, spec, &container, cancel).await?;
        }
        Ok(())
    }

    async fn publish_timoni(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let registries = project
            .global
            .ci
            .providers
            .timoni
            .as_ref()
            .map(|t| t.registries.as_slice())
            .unwrap_or_default();
        if registries.is_empty() {
            return Err(Error::Config("must specify at least one Timoni registry".to_string()));
        }
        let version = self.version(project)?;
        let version = version.trim_start_matches('v');

        for registry in registries {
            let container = module_container(project, self.module_name(project), registry);
            ensure_managed_repository(ctx, project, &container, cancel).await?;
            let spec = CommandSpec::new(ctx.tool_bin("timoni"))
                .args(["mod", "push", "--version", version, "--latest=false"])
                .arg(&project.rel_path)
                .arg(format!("oci://{}", container))
                .current_dir(&project.repo_root);
            self.run(ctx, spec, &container, cancel).await?;
        }
        Ok(())
    }

    async fn publish_cue(&self, ctx: &ReleaseContext, project: &Project, cancel: &CancellationToken) -> Result<()> {
        let cue = project.global.ci.providers.cue.as_ref();
        let registry = cue
            .map(|c| c.registry.trim_end_matches('/'))
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Config("must specify a CUE registry".to_string()))?;
        let version = self.version(project)?;
        let full_registry = match cue.and_then(|c| c.registry_prefix.as_deref()) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", registry, prefix.trim_matches('/')),
            _ => registry.to_string(),
        };

        let module = read_cue_module(&project.path).await?;
        ensure_managed_repository(ctx, project, &format!("{}/{}", registry, module), cancel).await?;

        let spec = CommandSpec::new(ctx.tool_bin("cue"))
            .args(["mod", "publish"])
            .arg(&version)
            .env("CUE_REGISTRY", &full_registry)
            .current_dir(&project.path);
        self.run(ctx, spec, &module, cancel).await
    }
}

/// Module path declared in `cue.mod/module.cue`, without the `@vN` suffix.
async fn read_cue_module(project_dir: &Path) -> Result<String> {
    let path = project_dir.join("cue.mod").join("module.cue");
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::Config(format!("failed to read module file {}: {}", path.display(), e)))?;
    let module = CUE_MODULE
        .captures(&content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::Config(format!("{} does not declare a module", path.display())))?;
    Ok(module.split('@').next().unwrap_or(module).to_string())
}

#[async_trait]
impl ReleaseProvider for OciModuleRelease {
    fn build_options(&self, _ctx: &ReleaseContext) -> Option<BuildOptions> {
        None
    }

    async fn publish(
        &self,
        ctx: &ReleaseContext,
        project: &Project,
        _target: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        match self.tool {
            ModuleTool::Kcl => self.publish_kcl(ctx, project, cancel).await,
            ModuleTool::Timoni => self.publish_timoni(ctx, project, cancel).await,
            ModuleTool::Cue => self.publish_cue(ctx, project, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, project_from_kdl};
    use shipwright_project::ProjectTag;

    #[test]
    fn test_module_container() {
        let project = project_from_kdl(r#"global { repo { name "org/repo" } }; project { name "svc" }"#);
        assert_eq!(module_container(&project, "svc", "r.example.com/"), "r.example.com/repo/svc");
        assert_eq!(module_container(&project, "svc", "ghcr.io/org"), "ghcr.io/org/svc");
    }

    #[tokio::test]
    async fn test_timoni_push_strips_version_prefix() {
        let recorder = Recorder::new();
        let ctx = recorder.context("/tmp/unused");
        let mut project = project_from_kdl(
            r#"
            global {
                repo { name "org/repo" }
                ci { providers { timoni { registries "r.example.com" } } }
            }
            project { name "svc" }
            "#,
        );
        project.tag = ProjectTag::parse("svc/v0.3.1");

        OciModuleRelease::new(ModuleTool::Timoni, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            recorder.calls(),
            vec!["timoni mod push --version 0.3.1 --latest=false svc oci://r.example.com/repo/svc"]
        );
    }

    #[tokio::test]
    async fn test_timoni_requires_version() {
        let recorder = Recorder::new();
        let ctx = recorder.context("/tmp/unused");
        let project = project_from_kdl(
            r#"
            global { ci { providers { timoni { registries "r.example.com" } } } }
            project { name "svc" }
            "#,
        );
        let err = OciModuleRelease::new(ModuleTool::Timoni, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_kcl_requires_registries() {
        let recorder = Recorder::new();
        let ctx = recorder.context("/tmp/unused");
        let project = project_from_kdl(r#"project { name "svc" }"#);
        let err = OciModuleRelease::new(ModuleTool::Kcl, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("KCL")));
    }

    #[tokio::test]
    async fn test_cue_publish_sets_registry_for_child_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cue.mod")).unwrap();
        std::fs::write(
            dir.path().join("cue.mod/module.cue"),
            "module: \"example.com/schemas@v0\"\nlanguage: version: \"v0.11.0\"\n",
        )
        .unwrap();

        let recorder = Recorder::new();
        let ctx = recorder.context("/tmp/unused");
        let mut project = project_from_kdl(
            r#"
            global {
                ci { providers { cue { registry "r.example.com"; registry-prefix "cue" } } }
            }
            project { name "schemas" }
            "#,
        );
        project.path = dir.path().to_path_buf();
        project.tag = ProjectTag::parse("v1.4.0");

        OciModuleRelease::new(ModuleTool::Cue, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(recorder.calls(), vec!["cue mod publish v1.4.0"]);
        let spec = recorder.last_spec().unwrap();
        assert_eq!(spec.env.get("CUE_REGISTRY").map(String::as_str), Some("r.example.com/cue"));
        assert_eq!(spec.working_dir.as_deref(), Some(dir.path()));
        assert!(std::env::var("CUE_REGISTRY").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_publish_touches_nothing() {
        let recorder = Recorder::new();
        let ctx = recorder.context("/tmp/unused");
        let project = project_from_kdl(
            r#"
            global {
                repo { name "org/repo" }
                ci { providers { kcl { registries "123456789012.dkr.ecr.us-east-1.amazonaws.com" } } }
            }
            project { name "svc" }
            "#,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = OciModuleRelease::new(ModuleTool::Kcl, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(recorder.calls().is_empty());

        let err = ensure_managed_repository(
            &ctx,
            &project,
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/repo/svc",
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_surfaces_output() {
        let recorder = Recorder::new().failing("kcl");
        let ctx = recorder.context("/tmp/unused");
        let project = project_from_kdl(
            r#"
            global { ci { providers { kcl { registries "r.example.com" } } } }
            project { name "svc" }
            "#,
        );
        let err = OciModuleRelease::new(ModuleTool::Kcl, OciModuleConfig::default())
            .publish(&ctx, &project, "publish", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Publish(m) if m.contains("denied")));
    }
}
