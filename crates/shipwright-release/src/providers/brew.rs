//! Homebrew formula published to a tap repository after a forge release.
//!
//! The formula points at the archives attached to the release, one per
//! macOS/Linux platform, and is committed to `Formula/<project>.rb` in the
//! tap. Pushes authenticate with the forge token through a git credential
//! helper, so the token never appears in a command line.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use shipwright_core::executor::CommandSpec;
use shipwright_core::platform::file_slug;
use shipwright_core::{CancellationToken, Error, Result};
use shipwright_project::{Project, ProjectTag};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

use crate::context::{ReleaseContext, cancellable, ensure_active};

const TAP_DIR: &str = "homebrew-tap";
const TOKEN_VAR: &str = "SHIPWRIGHT_TAP_TOKEN";
const CREDENTIAL_HELPER: &str =
    "!f() { echo username=forge; echo \"password=${SHIPWRIGHT_TAP_TOKEN}\"; }; f";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrewConfig {
    #[serde(default)]
    pub description: String,
    /// Executable installed from the archive. Defaults to the project name.
    pub binary_name: Option<String>,
    pub tap: TapConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TapConfig {
    /// Clone URL of the tap repository.
    pub repository: String,
    pub branch: Option<String>,
}

/// Download location and checksum of one platform's archive.
#[derive(Debug, Clone, PartialEq)]
pub struct BrewAsset {
    pub url: String,
    pub sha256: String,
}

/// Inputs to [`render_formula`].
#[derive(Debug, Clone)]
pub struct Formula {
    pub name: String,
    pub description: String,
    pub homepage: String,
    pub version: String,
    pub binary: String,
    /// Keyed by platform, e.g. `darwin/arm64`.
    pub assets: BTreeMap<String, BrewAsset>,
}

/// Homebrew class name: `my-cli` -> `MyCli`.
pub fn class_name(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn cpu_check(arch: &str) -> Option<&'static str> {
    match arch {
        "arm64" => Some("Hardware::CPU.arm?"),
        "amd64" => Some("Hardware::CPU.intel?"),
        _ => None,
    }
}

pub fn render_formula(formula: &Formula) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "class {} < Formula", class_name(&formula.name));
    let _ = writeln!(out, "  desc {:?}", formula.description);
    let _ = writeln!(out, "  homepage {:?}", formula.homepage);
    let _ = writeln!(out, "  version {:?}", formula.version);

    for (os, block) in [("darwin", "on_macos"), ("linux", "on_linux")] {
        let assets: Vec<_> = formula
            .assets
            .iter()
            .filter_map(|(platform, asset)| {
                let (p_os, arch) = platform.split_once('/')?;
                (p_os == os).then_some((cpu_check(arch)?, asset))
            })
            .collect();
        if assets.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n  {} do", block);
        for (check, asset) in assets {
            let _ = writeln!(out, "    if {}", check);
            let _ = writeln!(out, "      url {:?}", asset.url);
            let _ = writeln!(out, "      sha256 {:?}", asset.sha256);
            let _ = writeln!(out, "    end");
        }
        let _ = writeln!(out, "  end");
    }

    let _ = writeln!(out, "\n  def install");
    let _ = writeln!(out, "    bin.install {:?}", formula.binary);
    let _ = writeln!(out, "  end");
    let _ = writeln!(out, "end");
    out
}

fn is_brew_platform(platform: &str) -> bool {
    platform
        .split_once('/')
        .is_some_and(|(os, arch)| matches!(os, "darwin" | "linux") && cpu_check(arch).is_some())
}

async fn sha256_file(path: &Path) -> Result<String> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| Error::Publish(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(hex::encode(Sha256::digest(&body)))
}

/// Render the formula for `tag` and push it to the configured tap.
pub async fn publish_formula(
    ctx: &ReleaseContext,
    project: &Project,
    tag: &ProjectTag,
    config: &BrewConfig,
    prefix: &str,
    platforms: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    if config.tap.repository.is_empty() {
        return Err(Error::Config("brew releases require a tap repository".to_string()));
    }
    let repository = Some(project.global.repo.name.as_str())
        .filter(|name| !name.is_empty())
        .or(project.ci.repository.as_deref())
        .ok_or_else(|| Error::Config("brew releases require a repository name".to_string()))?;

    let mut assets = BTreeMap::new();
    for platform in platforms {
        if !is_brew_platform(platform) {
            warn!(platform = %platform, "Platform not supported by Homebrew, skipping");
            continue;
        }
        let filename = format!("{}-{}.tar.gz", prefix, file_slug(platform));
        let asset = BrewAsset {
            url: format!("https://github.com/{}/releases/download/{}/{}", repository, tag.full, filename),
            sha256: sha256_file(&ctx.workdir().join(&filename)).await?,
        };
        assets.insert(platform.clone(), asset);
    }
    if assets.is_empty() {
        return Err(Error::Config(format!(
            "no platform of {} is supported by Homebrew",
            project.name
        )));
    }

    let formula = render_formula(&Formula {
        name: project.name.clone(),
        description: config.description.clone(),
        homepage: format!("https://github.com/{}", repository),
        version: tag.version.trim_start_matches('v').to_string(),
        binary: config.binary_name.clone().unwrap_or_else(|| project.name.clone()),
        assets,
    });

    let token = cancellable(cancel, ctx.forge()?.git_token()).await?;
    let tap = Tap {
        ctx,
        dir: ctx.workdir().join(TAP_DIR),
        token,
    };
    let branch = config.tap.branch.as_deref().unwrap_or("main");
    info!(repository = %config.tap.repository, branch = %branch, "Publishing Homebrew formula");

    if tap.dir.exists() {
        tokio::fs::remove_dir_all(&tap.dir)
            .await
            .map_err(|e| tap_io(&tap.dir, e))?;
    }
    tap.git(
        ctx.workdir(),
        &["clone", "--depth", "1", "--branch", branch, &config.tap.repository, TAP_DIR],
        cancel,
    )
    .await?;

    let relative = format!("Formula/{}.rb", project.name);
    let path = tap.dir.join(&relative);
    if tokio::fs::read_to_string(&path).await.ok().as_deref() == Some(formula.as_str()) {
        info!(formula = %relative, "Formula is up to date");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| tap_io(parent, e))?;
    }
    tokio::fs::write(&path, &formula)
        .await
        .map_err(|e| tap_io(&path, e))?;

    let message = format!("feat(brew): update {} to version {}", project.name, tag.full);
    tap.git(&tap.dir, &["add", &relative], cancel).await?;
    tap.git(&tap.dir, &["commit", "-m", &message], cancel).await?;
    tap.git(&tap.dir, &["push", "origin", &format!("HEAD:{}", branch)], cancel)
        .await?;
    info!(formula = %relative, "Homebrew formula published");
    Ok(())
}

fn tap_io(path: &Path, err: std::io::Error) -> Error {
    Error::Publish(format!("tap repository {}: {}", path.display(), err))
}

struct Tap<'a> {
    ctx: &'a ReleaseContext,
    dir: std::path::PathBuf,
    token: Option<String>,
}

impl Tap<'_> {
    async fn git(&self, cwd: &Path, args: &[&str], cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let mut spec = CommandSpec::new(self.ctx.tool_bin("git"))
            .args(args.iter().copied())
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_AUTHOR_NAME", "shipwright")
            .env("GIT_AUTHOR_EMAIL", "shipwright@users.noreply.github.com")
            .env("GIT_COMMITTER_NAME", "shipwright")
            .env("GIT_COMMITTER_EMAIL", "shipwright@users.noreply.github.com")
            .quiet();
        if let Some(token) = &self.token {
            spec = spec
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "credential.helper")
                .env("GIT_CONFIG_VALUE_0", CREDENTIAL_HELPER)
                .env(TOKEN_VAR, token);
        }
        let output = self.ctx.executor.execute(spec, cancel).await?;
        if !output.success() {
            return Err(Error::Publish(format!(
                "git {} failed in tap repository: {}",
                args.first().copied().unwrap_or_default(),
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("my-cli"), "MyCli");
        assert_eq!(class_name("forge_tool.v2"), "ForgeToolV2");
    }

    #[test]
    fn test_render_formula_groups_platforms() {
        let asset = |url: &str| BrewAsset {
            url: url.to_string(),
            sha256: "abc".to_string(),
        };
        let formula = render_formula(&Formula {
            name: "my-cli".into(),
            description: "A test CLI".into(),
            homepage: "https://github.com/org/my-cli".into(),
            version: "0.1.0".into(),
            binary: "my-cli".into(),
            assets: BTreeMap::from([
                ("darwin/arm64".to_string(), asset("https://d/arm")),
                ("linux/amd64".to_string(), asset("https://l/amd")),
            ]),
        });

        assert!(formula.starts_with("class MyCli < Formula\n"));
        assert!(formula.contains("  desc \"A test CLI\"\n"));
        assert!(formula.contains("  version \"0.1.0\"\n"));
        assert!(formula.contains(
            "  on_macos do\n    if Hardware::CPU.arm?\n      url \"https://d/arm\"\n      sha256 \"abc\"\n    end\n  end\n"
        ));
        assert!(formula.contains("  on_linux do\n    if Hardware::CPU.intel?\n      url \"https://l/amd\""));
        assert!(formula.contains("    bin.install \"my-cli\"\n"));
    }

    #[test]
    fn test_brew_platforms() {
        assert!(is_brew_platform("darwin/amd64"));
        assert!(is_brew_platform("linux/arm64"));
        assert!(!is_brew_platform("windows/amd64"));
        assert!(!is_brew_platform("linux/386"));
    }
}
