//! Secret references and secret storage abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::{Error, Result};

/// A reference to a secret held by a secret store.
///
/// Exactly one of `name` or `maps` must be set. `name` binds the whole secret
/// to one id; `maps` binds subkeys of a JSON-object secret to several ids
/// (`subkey -> id`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecretRef {
    /// Store to read from (`env`, `aws`).
    pub provider: String,
    /// Store-specific path or name of the secret.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub maps: BTreeMap<String, String>,
    #[serde(default)]
    pub optional: bool,
}

impl SecretRef {
    /// Check that exactly one of `name` and `maps` is set.
    pub fn validate(&self) -> Result<()> {
        match (&self.name, self.maps.is_empty()) {
            (Some(_), false) => Err(Error::Config(format!(
                "secret {}:{} sets both name and maps",
                self.provider, self.path
            ))),
            (None, true) => Err(Error::Config(format!(
                "secret {}:{} must set either name or maps",
                self.provider, self.path
            ))),
            _ => Ok(()),
        }
    }
}

/// Trait for secret storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the raw value of a secret by path.
    async fn get(&self, path: &str) -> Result<String>;
}

/// Secret stores keyed by provider name.
#[derive(Clone, Default)]
pub struct SecretStores {
    stores: HashMap<String, Arc<dyn SecretStore>>,
}

impl SecretStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Into<String>, store: Arc<dyn SecretStore>) -> Self {
        self.stores.insert(provider.into(), store);
        self
    }

    /// Fetch the raw value referenced by `secret`.
    pub async fn get(&self, secret: &SecretRef) -> Result<String> {
        let store = self.stores.get(&secret.provider).ok_or_else(|| {
            Error::Config(format!("unknown secret provider: {}", secret.provider))
        })?;
        store.get(&secret.path).await
    }
}

impl std::fmt::Debug for SecretStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.stores.keys().collect();
        providers.sort();
        f.debug_struct("SecretStores")
            .field("providers", &providers)
            .finish()
    }
}
