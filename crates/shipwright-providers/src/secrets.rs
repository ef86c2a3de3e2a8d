//! Secret store backends.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use shipwright_core::secret::{SecretStore, SecretStores};
use shipwright_core::{Environment, Error, Result};
use std::sync::Arc;
use tracing::debug;

use crate::error::AwsError;

/// Reads secrets from environment variables; the path is the variable name.
pub struct EnvSecretStore {
    env: Arc<dyn Environment>,
}

impl EnvSecretStore {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, path: &str) -> Result<String> {
        self.env
            .var(path)
            .ok_or_else(|| Error::Environment(format!("environment variable {} is not set", path)))
    }
}

/// Reads secrets from AWS Secrets Manager; the path is the secret id.
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get(&self, path: &str) -> Result<String> {
        debug!(secret_id = %path, "Fetching secret");
        let response = self
            .client
            .get_secret_value()
            .secret_id(path)
            .send()
            .await
            .map_err(|e| AwsError::SecretsManager(format!("{}: {}", path, e)))?;

        response
            .secret_string()
            .map(String::from)
            .ok_or_else(|| {
                AwsError::SecretsManager(format!("{} has no string value", path)).into()
            })
    }
}

/// The `env` and `aws` secret stores.
pub fn default_stores(env: Arc<dyn Environment>, aws: &aws_config::SdkConfig) -> SecretStores {
    SecretStores::new()
        .with("env", Arc::new(EnvSecretStore::new(env)))
        .with("aws", Arc::new(AwsSecretStore::new(aws)))
}
