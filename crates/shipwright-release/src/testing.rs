//! Test doubles recording every external call in one timeline.

use async_trait::async_trait;
use shipwright_core::executor::{CommandExecutor, CommandOutput, CommandSpec};
use shipwright_core::platform::host_platform;
use shipwright_core::{CancellationToken, MapEnv};
use shipwright_executor::{BuildDriver, BuildError, BuildOptions, BuildResult};
use shipwright_project::Project;
use shipwright_providers::ecr::RepositoryTags;
use shipwright_providers::github::{ForgeClient, ForgeRelease, NewRelease, PrComment, ReleaseAsset};
use shipwright_providers::s3::{ListPage, ObjectStore};
use shipwright_providers::{AwsResult, ForgeResult, RegistryProvisioner};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::context::ReleaseContext;

/// A project decoded from a single blueprint, with default git and CI state.
pub fn project_from_kdl(source: &str) -> Project {
    use shipwright_config::{apply_default_setters, decode_blueprint, merge_documents, parse_document};

    let mut document = merge_documents(None, Some(parse_document(source).unwrap())).unwrap();
    apply_default_setters(&mut document).unwrap();
    let blueprint = decode_blueprint(&document).unwrap();
    let config = blueprint.project.unwrap();
    Project {
        name: config.name.clone(),
        path: std::path::PathBuf::from("/repo").join(&config.name),
        repo_root: "/repo".into(),
        rel_path: config.name.clone(),
        global: blueprint.global,
        config,
        document,
        build_file: None,
        tag: None,
        git: Default::default(),
        ci: Default::default(),
    }
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    last_spec: Option<CommandSpec>,
    repositories: Vec<String>,
    objects: BTreeMap<String, String>,
    releases: Vec<ForgeRelease>,
    comments: BTreeMap<u64, Vec<String>>,
    branches: Vec<String>,
    git_token: Option<String>,
}

/// Fake build driver, command executor, registry, bucket and forge.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<State>>,
    failing: Vec<String>,
    artifacts: Vec<(String, String)>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendered form starts with `prefix` exit non-zero.
    pub fn failing(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.to_string());
        self
    }

    /// A file the build writes to `<artifact dir>/<platform>/` for every platform.
    pub fn with_artifact(mut self, path: &str, content: &str) -> Self {
        self.artifacts.push((path.to_string(), content.to_string()));
        self
    }

    pub fn with_repository(self, name: &str) -> Self {
        self.state.lock().unwrap().repositories.push(name.to_string());
        self
    }

    pub fn with_objects(self, keys: &[&str]) -> Self {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.objects.insert(key.to_string(), String::new());
        }
        drop(state);
        self
    }

    pub fn with_branches(self, branches: &[&str]) -> Self {
        self.state.lock().unwrap().branches = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn with_git_token(self, token: &str) -> Self {
        self.state.lock().unwrap().git_token = Some(token.to_string());
        self
    }

    pub fn with_comment(self, pr: u64, body: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .comments
            .entry(pr)
            .or_default()
            .push(body.to_string());
        self
    }

    pub fn context(&self, workdir: impl AsRef<Path>) -> ReleaseContext {
        let me = Arc::new(self.clone());
        ReleaseContext::new(me.clone(), me.clone(), me.clone(), me.clone(), workdir.as_ref())
            .with_forge(me.clone())
            .with_env(Arc::new(MapEnv::new()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn last_spec(&self) -> Option<CommandSpec> {
        self.state.lock().unwrap().last_spec.clone()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BuildDriver for Recorder {
    async fn run_target(
        &self,
        project: &Project,
        target: &str,
        opts: &BuildOptions,
        _cancel: &CancellationToken,
    ) -> BuildResult<()> {
        let line = format!("run {}", target);
        let fail = self.failing.iter().any(|p| line.starts_with(p.as_str()));
        self.record(line);
        if fail {
            return Err(BuildError::Failed {
                target: target.to_string(),
                platform: host_platform(),
                attempts: 1,
                output: "exit status 1".to_string(),
            });
        }
        if let Some(dir) = &opts.artifact_dir {
            let mut platforms = project.platforms(target)?;
            if platforms.is_empty() {
                platforms.push(host_platform());
            }
            for platform in platforms {
                for (path, content) in &self.artifacts {
                    let file = dir.join(&platform).join(path);
                    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
                    std::fs::write(file, content).unwrap();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for Recorder {
    async fn execute(
        &self,
        spec: CommandSpec,
        _cancel: &CancellationToken,
    ) -> shipwright_core::Result<CommandOutput> {
        let line = spec.to_string();
        let fail = self.failing.iter().any(|p| line.starts_with(p.as_str()));
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(line);
            state.last_spec = Some(spec);
        }
        if fail {
            return Ok(CommandOutput::failed(1, "denied: requested access to the resource is denied"));
        }
        Ok(CommandOutput::ok())
    }
}

#[async_trait]
impl RegistryProvisioner for Recorder {
    async fn repository_exists(&self, name: &str) -> AwsResult<bool> {
        self.record(format!("describe {}", name));
        Ok(self.state.lock().unwrap().repositories.iter().any(|r| r == name))
    }

    async fn create_repository(&self, name: &str, tags: &RepositoryTags) -> AwsResult<()> {
        self.record(format!("create {} {} {}", name, tags.repo, tags.repo_path));
        self.state.lock().unwrap().repositories.push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Recorder {
    async fn put_object(&self, _bucket: &str, key: &str, _body: Vec<u8>, content_type: &str) -> AwsResult<()> {
        self.record(format!("put {} {}", key, content_type));
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), content_type.to_string());
        Ok(())
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> AwsResult<()> {
        self.record(format!("delete {}", key));
        self.state.lock().unwrap().objects.remove(key);
        Ok(())
    }

    async fn list_objects_v2(
        &self,
        _bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        _continuation: Option<String>,
    ) -> AwsResult<ListPage> {
        self.record(format!("list {}", prefix));
        let state = self.state.lock().unwrap();
        let mut page = ListPage::default();
        for key in state.objects.keys() {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match delimiter.and_then(|d| rest.find(d).map(|i| &rest[..i + d.len()])) {
                Some(common) => {
                    let common = format!("{}{}", prefix, common);
                    if !page.common_prefixes.contains(&common) {
                        page.common_prefixes.push(common);
                    }
                }
                None => page.keys.push(key.clone()),
            }
        }
        Ok(page)
    }
}

#[async_trait]
impl ForgeClient for Recorder {
    async fn get_release_by_tag(&self, tag: &str) -> ForgeResult<Option<ForgeRelease>> {
        self.record(format!("get-release {}", tag));
        Ok(self
            .state
            .lock()
            .unwrap()
            .releases
            .iter()
            .find(|r| r.tag_name == tag)
            .cloned())
    }

    async fn create_release(&self, release: &NewRelease) -> ForgeResult<ForgeRelease> {
        self.record(format!("create-release {} {}", release.tag_name, release.name));
        let mut state = self.state.lock().unwrap();
        let created = ForgeRelease {
            id: state.releases.len() as u64 + 1,
            tag_name: release.tag_name.clone(),
            name: Some(release.name.clone()),
            assets: Vec::new(),
        };
        state.releases.push(created.clone());
        Ok(created)
    }

    async fn upload_release_asset(
        &self,
        release: &ForgeRelease,
        name: &str,
        _body: Vec<u8>,
    ) -> ForgeResult<ReleaseAsset> {
        self.record(format!("upload {}", name));
        let mut state = self.state.lock().unwrap();
        let asset = ReleaseAsset {
            id: 100 + state.releases.iter().map(|r| r.assets.len() as u64).sum::<u64>(),
            name: name.to_string(),
        };
        if let Some(stored) = state.releases.iter_mut().find(|r| r.id == release.id) {
            stored.assets.push(asset.clone());
        }
        Ok(asset)
    }

    async fn list_pr_comments(&self, pr: u64) -> ForgeResult<Vec<PrComment>> {
        self.record(format!("list-comments {}", pr));
        Ok(self
            .state
            .lock()
            .unwrap()
            .comments
            .get(&pr)
            .map(|bodies| {
                bodies
                    .iter()
                    .map(|body| PrComment {
                        author: Some("github-actions[bot]".into()),
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn post_pr_comment(&self, pr: u64, body: &str) -> ForgeResult<()> {
        self.record(format!("post-comment {}", pr));
        self.state
            .lock()
            .unwrap()
            .comments
            .entry(pr)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn list_branches(&self) -> ForgeResult<Vec<String>> {
        self.record("list-branches".to_string());
        Ok(self.state.lock().unwrap().branches.clone())
    }

    async fn git_token(&self) -> ForgeResult<Option<String>> {
        Ok(self.state.lock().unwrap().git_token.clone())
    }
}

impl Recorder {
    pub fn comments(&self, pr: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .comments
            .get(&pr)
            .cloned()
            .unwrap_or_default()
    }
}
