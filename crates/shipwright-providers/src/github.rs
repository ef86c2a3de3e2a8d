//! GitHub API client for releases, pull request comments and branches.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shipwright_core::secret::{SecretRef, SecretStores};
use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};

const API_URL: &str = "https://api.github.com";
const UPLOADS_URL: &str = "https://uploads.github.com";
const USER_AGENT: &str = "shipwright";
const PER_PAGE: usize = 100;

/// A release on the forge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ForgeRelease {
    pub fn has_asset(&self, name: &str) -> bool {
        self.assets.iter().any(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
}

/// Request body for creating a release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub draft: bool,
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrComment {
    pub author: Option<String>,
    pub body: String,
}

#[derive(Deserialize)]
struct RawComment {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Deserialize)]
struct RawBranch {
    name: String,
}

/// Source forge operations used by releases.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// The release for `tag`, or `None` if there is none.
    async fn get_release_by_tag(&self, tag: &str) -> ForgeResult<Option<ForgeRelease>>;

    async fn create_release(&self, release: &NewRelease) -> ForgeResult<ForgeRelease>;

    async fn upload_release_asset(
        &self,
        release: &ForgeRelease,
        name: &str,
        body: Vec<u8>,
    ) -> ForgeResult<ReleaseAsset>;

    async fn list_pr_comments(&self, pr: u64) -> ForgeResult<Vec<PrComment>>;

    async fn post_pr_comment(&self, pr: u64, body: &str) -> ForgeResult<()>;

    /// Names of all branches.
    async fn list_branches(&self) -> ForgeResult<Vec<String>>;

    /// Token for pushing to repositories on the forge over HTTPS, if any.
    async fn git_token(&self) -> ForgeResult<Option<String>>;
}

/// GitHub REST API client for one repository.
pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    owner: String,
    repo: String,
    api_url: String,
    uploads_url: String,
}

impl GitHubClient {
    /// Client for `owner/repo`. Without a token requests are anonymous.
    pub fn new(repository: &str, token: Option<String>) -> ForgeResult<Self> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty())
            .ok_or(ForgeError::NoRepository)?;
        Ok(Self {
            client: reqwest::Client::new(),
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: API_URL.to_string(),
            uploads_url: UPLOADS_URL.to_string(),
        })
    }

    /// Point the client at another API host (GitHub Enterprise, tests).
    pub fn with_base_urls(mut self, api_url: impl Into<String>, uploads_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self.uploads_url = uploads_url.into().trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder, what: &str) -> ForgeResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ForgeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::Api {
                status,
                message: format!("{}: {}", what, text),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ForgeError::Parse(e.to_string()))
    }

    async fn paginate<T: DeserializeOwned>(&self, path: &str, what: &str) -> ForgeResult<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            debug!(owner = %self.owner, repo = %self.repo, path = %path, page, "Fetching page");
            let url = format!("{}?per_page={}&page={}", self.repo_url(path), PER_PAGE, page);
            let items: Vec<T> = Self::send(self.request(Method::GET, &url), what).await?;
            let last = items.len() < PER_PAGE;
            all.extend(items);
            if last {
                return Ok(all);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn get_release_by_tag(&self, tag: &str) -> ForgeResult<Option<ForgeRelease>> {
        let url = self.repo_url(&format!("releases/tags/{}", urlencoding::encode(tag)));
        match Self::send(self.request(Method::GET, &url), "Failed to get release").await {
            Ok(release) => Ok(Some(release)),
            Err(ForgeError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_release(&self, release: &NewRelease) -> ForgeResult<ForgeRelease> {
        info!(tag = %release.tag_name, name = %release.name, "Creating release");
        let url = self.repo_url("releases");
        Self::send(
            self.request(Method::POST, &url).json(release),
            "Failed to create release",
        )
        .await
    }

    async fn upload_release_asset(
        &self,
        release: &ForgeRelease,
        name: &str,
        body: Vec<u8>,
    ) -> ForgeResult<ReleaseAsset> {
        info!(release = release.id, asset = %name, bytes = body.len(), "Uploading release asset");
        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets?name={}",
            self.uploads_url,
            self.owner,
            self.repo,
            release.id,
            urlencoding::encode(name)
        );
        Self::send(
            self.request(Method::POST, &url)
                .header("Content-Type", "application/octet-stream")
                .body(body),
            "Failed to upload asset",
        )
        .await
    }

    async fn list_pr_comments(&self, pr: u64) -> ForgeResult<Vec<PrComment>> {
        let raw: Vec<RawComment> = self
            .paginate(&format!("issues/{}/comments", pr), "Failed to list comments")
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| PrComment {
                author: c.user.map(|u| u.login),
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn post_pr_comment(&self, pr: u64, body: &str) -> ForgeResult<()> {
        if pr == 0 {
            return Err(ForgeError::InvalidPullRequest(pr));
        }
        let url = self.repo_url(&format!("issues/{}/comments", pr));
        let _: serde_json::Value = Self::send(
            self.request(Method::POST, &url)
                .json(&serde_json::json!({ "body": body })),
            "Failed to post comment",
        )
        .await?;
        info!(pr, "Posted pull request comment");
        Ok(())
    }

    async fn list_branches(&self) -> ForgeResult<Vec<String>> {
        let raw: Vec<RawBranch> = self.paginate("branches", "Failed to list branches").await?;
        Ok(raw.into_iter().map(|b| b.name).collect())
    }

    async fn git_token(&self) -> ForgeResult<Option<String>> {
        Ok(self.token.clone())
    }
}

/// API token: `GITHUB_TOKEN` from CI when present, else the configured
/// credentials secret, else none.
///
/// A credentials secret using `maps` must map one of its keys to the id `token`.
pub async fn resolve_token(
    ci_token: Option<&str>,
    credentials: Option<&SecretRef>,
    stores: &SecretStores,
) -> shipwright_core::Result<Option<String>> {
    if let Some(token) = ci_token.filter(|t| !t.is_empty()) {
        return Ok(Some(token.to_string()));
    }
    let Some(secret) = credentials else {
        return Ok(None);
    };

    let raw = stores.get(secret).await?;
    if secret.maps.is_empty() {
        return Ok(Some(raw.trim().to_string()));
    }
    let key = secret
        .maps
        .iter()
        .find(|(_, id)| id.as_str() == "token")
        .map(|(key, _)| key)
        .ok_or_else(|| {
            shipwright_core::Error::Config(format!(
                "GitHub credentials {} must map a key to the id \"token\"",
                secret.path
            ))
        })?;
    let values: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        shipwright_core::Error::Config(format!("GitHub credentials {}: {}", secret.path, e))
    })?;
    values
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(|t| Some(t.to_string()))
        .ok_or_else(|| {
            shipwright_core::Error::Config(format!(
                "GitHub credentials {} have no key {}",
                secret.path, key
            ))
        })
}
