//! Managed container registry (ECR) provisioning.

use async_trait::async_trait;
use aws_sdk_ecr::Client;
use aws_sdk_ecr::types::{
    EncryptionConfiguration, EncryptionType, ImageScanningConfiguration, ImageTagMutability, Tag,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::{AwsError, AwsResult};

static ECR_REGISTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}\.dkr\.ecr\.[a-z0-9-]+\.amazonaws\.com").expect("valid ECR registry regex"));

/// Value of the `BuiltWith` tag on created repositories.
pub const BUILT_WITH: &str = "shipwright";

/// Metadata tags attached to a created repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTags {
    /// `owner/repo` of the source repository.
    pub repo: String,
    /// Project path within the source repository.
    pub repo_path: String,
}

/// Creates registry repositories on demand.
#[async_trait]
pub trait RegistryProvisioner: Send + Sync {
    async fn repository_exists(&self, name: &str) -> AwsResult<bool>;

    /// Create a repository. An already existing repository is not an error.
    async fn create_repository(&self, name: &str, tags: &RepositoryTags) -> AwsResult<()>;
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// Whether the registry host is an ECR registry.
pub fn is_managed_registry(url: &str) -> bool {
    let host = strip_scheme(url).split('/').next().unwrap_or_default();
    ECR_REGISTRY.is_match(host)
}

/// Repository name of an image reference: the path after the host, without
/// any tag or digest.
pub fn extract_repo_name(image: &str) -> Option<String> {
    let (_, path) = strip_scheme(image).split_once('/')?;
    let path = path.split_once('@').map_or(path, |(p, _)| p);
    let path = path.split_once(':').map_or(path, |(p, _)| p);
    (!path.is_empty()).then(|| path.to_string())
}

/// Create the repository backing `image` if it does not exist yet.
pub async fn ensure_repository(
    provisioner: &dyn RegistryProvisioner,
    image: &str,
    tags: &RepositoryTags,
) -> AwsResult<()> {
    let name = extract_repo_name(image)
        .ok_or_else(|| AwsError::Ecr(format!("invalid image reference: {}", image)))?;
    if provisioner.repository_exists(&name).await? {
        debug!(repository = %name, "Repository exists");
        return Ok(());
    }
    info!(repository = %name, "Creating repository");
    provisioner.create_repository(&name, tags).await
}

/// ECR client.
pub struct EcrProvisioner {
    client: Client,
}

impl EcrProvisioner {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn tag(key: &str, value: &str) -> AwsResult<Tag> {
    Tag::builder()
        .key(key)
        .value(value)
        .build()
        .map_err(|e| AwsError::Ecr(e.to_string()))
}

#[async_trait]
impl RegistryProvisioner for EcrProvisioner {
    async fn repository_exists(&self, name: &str) -> AwsResult<bool> {
        match self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_repository_not_found_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(AwsError::Ecr(format!("describe {}: {}", name, e))),
        }
    }

    async fn create_repository(&self, name: &str, tags: &RepositoryTags) -> AwsResult<()> {
        let encryption = EncryptionConfiguration::builder()
            .encryption_type(EncryptionType::Aes256)
            .build()
            .map_err(|e| AwsError::Ecr(e.to_string()))?;

        let result = self
            .client
            .create_repository()
            .repository_name(name)
            .image_tag_mutability(ImageTagMutability::Immutable)
            .image_scanning_configuration(
                ImageScanningConfiguration::builder()
                    .scan_on_push(true)
                    .build(),
            )
            .encryption_configuration(encryption)
            .tags(tag("BuiltWith", BUILT_WITH)?)
            .tags(tag("Repo", &tags.repo)?)
            .tags(tag("RepoPath", &tags.repo_path)?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_repository_already_exists_exception()) =>
            {
                debug!(repository = %name, "Repository already exists");
                Ok(())
            }
            Err(e) => Err(AwsError::Ecr(format!("create {}: {}", name, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_is_managed_registry() {
        assert!(is_managed_registry("123456789012.dkr.ecr.us-west-2.amazonaws.com"));
        assert!(is_managed_registry("https://123456789012.dkr.ecr.eu-central-1.amazonaws.com/repo/app"));
        assert!(!is_managed_registry("ghcr.io/org"));
        assert!(!is_managed_registry("12345.dkr.ecr.us-west-2.amazonaws.com"));
        assert!(!is_managed_registry("r.example.com/123456789012.dkr.ecr.us-west-2.amazonaws.com"));
    }

    #[test]
    fn test_extract_repo_name() {
        let registry = "123456789012.dkr.ecr.us-west-2.amazonaws.com";
        assert_eq!(extract_repo_name(&format!("{}/repo/svc", registry)).as_deref(), Some("repo/svc"));
        assert_eq!(extract_repo_name(&format!("{}/app:v1.0.0", registry)).as_deref(), Some("app"));
        assert_eq!(
            extract_repo_name(&format!("oci://{}/app@sha256:abcd", registry)).as_deref(),
            Some("app")
        );
        assert!(extract_repo_name(registry).is_none());
    }

    #[derive(Default)]
    struct Recording {
        existing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RegistryProvisioner for Recording {
        async fn repository_exists(&self, name: &str) -> AwsResult<bool> {
            self.calls.lock().unwrap().push(format!("describe {}", name));
            Ok(self.existing.iter().any(|e| e == name))
        }

        async fn create_repository(&self, name: &str, tags: &RepositoryTags) -> AwsResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {} {}", name, tags.repo, tags.repo_path));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ensure_repository() {
        let tags = RepositoryTags {
            repo: "org/repo".into(),
            repo_path: "services/svc".into(),
        };
        let provisioner = Recording {
            existing: vec!["repo/existing".into()],
            ..Default::default()
        };
        let registry = "123456789012.dkr.ecr.us-west-2.amazonaws.com";

        ensure_repository(&provisioner, &format!("{}/repo/svc", registry), &tags)
            .await
            .unwrap();
        ensure_repository(&provisioner, &format!("{}/repo/existing:v1", registry), &tags)
            .await
            .unwrap();

        assert_eq!(
            *provisioner.calls.lock().unwrap(),
            vec![
                "describe repo/svc",
                "create repo/svc org/repo services/svc",
                "describe repo/existing",
            ]
        );
    }
}
