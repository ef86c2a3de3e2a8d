//! Typed blueprint schema.
//!
//! These structs are decoded from a fully injected document. Field names
//! follow the KDL node names (kebab-case).

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use shipwright_core::secret::SecretRef;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Blueprint {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub project: Option<ProjectConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Global {
    #[serde(default)]
    pub repo: Repo,
    #[serde(default)]
    pub ci: GlobalCi,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Repo {
    /// `owner/repo`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default_branch: String,
}

impl Repo {
    pub fn owner(&self) -> Option<&str> {
        self.name.split_once('/').map(|(owner, _)| owner)
    }

    /// The trailing segment of `owner/repo`.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalCi {
    #[serde(default, deserialize_with = "one_or_many")]
    pub registries: Vec<String>,
    /// Secrets passed to every target.
    #[serde(default, deserialize_with = "one_or_many")]
    pub secrets: Vec<SecretRef>,
    #[serde(default)]
    pub providers: Providers,
    #[serde(default)]
    pub tagging: Tagging,
    #[serde(default)]
    pub release: GlobalRelease,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Providers {
    pub aws: Option<AwsProvider>,
    pub github: Option<GithubProvider>,
    pub docker: Option<DockerProvider>,
    pub earthly: Option<EarthlyProvider>,
    pub kcl: Option<ModuleRegistries>,
    pub timoni: Option<ModuleRegistries>,
    pub cue: Option<CueProvider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AwsProvider {
    pub region: Option<String>,
    pub registry: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GithubProvider {
    pub registry: Option<String>,
    pub credentials: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DockerProvider {
    pub credentials: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EarthlyProvider {
    pub satellite: Option<String>,
    pub config: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleRegistries {
    #[serde(default, deserialize_with = "one_or_many")]
    pub registries: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CueProvider {
    #[serde(default)]
    pub registry: String,
    pub registry_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Tagging {
    #[serde(default)]
    pub strategy: String,
    /// Alias -> project path.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalRelease {
    pub docs: Option<DocsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocsConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Regexes for keys that survive the stale-file sweep.
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub reap_branches: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub name: String,
    pub container: Option<String>,
    #[serde(default)]
    pub ci: ProjectCi,
    #[serde(default)]
    pub release: BTreeMap<String, Release>,
    #[serde(default)]
    pub deployment: Option<Deployment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectCi {
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Target {
    #[serde(default, deserialize_with = "string_map")]
    pub args: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub retries: Option<Retries>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub secrets: Vec<SecretRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Retries {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, deserialize_with = "duration", skip_serializing)]
    pub delay: Option<Duration>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Release {
    /// Provider type. Defaults to the release key.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub target: Option<String>,
    /// Event name -> event config.
    #[serde(default)]
    pub on: BTreeMap<String, serde_json::Value>,
    /// Provider-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Release {
    /// Decode the provider-specific config, treating a missing block as empty.
    pub fn decode_config<T: DeserializeOwned + Default>(&self) -> serde_json::Result<T> {
        match &self.config {
            serde_json::Value::Null => Ok(T::default()),
            other => serde_json::from_value(other.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Deployment {
    #[serde(default)]
    pub modules: BTreeMap<String, DeploymentModule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentModule {
    pub name: Option<String>,
    pub instance: Option<String>,
    pub version: Option<String>,
    pub registry: Option<String>,
    #[serde(default)]
    pub values: serde_json::Value,
}

/// Accept a single value, a list, or an empty block for list-typed fields.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
            .collect(),
        serde_json::Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        single => serde_json::from_value(single)
            .map(|item| vec![item])
            .map_err(D::Error::custom),
    }
}

/// Map whose scalar values are stringified (`count 3` -> `"3"`).
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "argument {} must be a scalar, got {}",
                        key, other
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| D::Error::custom(format!("invalid delay: {}", n))),
        serde_json::Value::String(s) => parse_duration(&s).map(Some).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("invalid delay: {}", other))),
    }
}

/// Parse `250ms`, `5s`, `2m`, `1h` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let n: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("invalid duration unit '{}' in '{}'", other, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_target() {
        let json = serde_json::json!({
            "args": {"version": "1.2", "count": 3},
            "platforms": "linux/amd64",
            "privileged": true,
            "retries": {"attempts": 2, "delay": "250ms", "filters": "rate limit"},
            "secrets": {"provider": "env", "path": "TOKEN", "name": "token"}
        });
        let target: Target = serde_json::from_value(json).unwrap();
        assert_eq!(target.args["count"], "3");
        assert_eq!(target.platforms, vec!["linux/amd64"]);
        let retries = target.retries.unwrap();
        assert_eq!(retries.delay, Some(Duration::from_millis(250)));
        assert_eq!(retries.filters, vec!["rate limit"]);
        assert_eq!(target.secrets.len(), 1);
    }

    #[test]
    fn test_empty_block_is_empty_list() {
        let ci: GlobalCi = serde_json::from_value(serde_json::json!({"registries": {}})).unwrap();
        assert!(ci.registries.is_empty());
    }

    #[test]
    fn test_release_config_defaults_when_absent() {
        #[derive(Debug, Default, Deserialize)]
        struct Config {
            tag: Option<String>,
        }
        let release: Release = serde_json::from_value(serde_json::json!({"type": "container"})).unwrap();
        assert_eq!(release.kind.as_deref(), Some("container"));
        assert!(release.decode_config::<Config>().unwrap().tag.is_none());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5 weeks").is_err());
    }

    #[test]
    fn test_repo_short_name() {
        let repo = Repo {
            name: "org/repo".into(),
            default_branch: "main".into(),
        };
        assert_eq!(repo.short_name(), "repo");
        assert_eq!(repo.owner(), Some("org"));
    }
}
