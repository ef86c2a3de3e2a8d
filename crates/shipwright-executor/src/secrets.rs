//! Resolving secret references into build-driver secrets.

use shipwright_core::secret::{SecretRef, SecretStores};
use shipwright_core::{CancellationToken, Error, cancellable};
use tracing::{info, warn};

use crate::{BuildError, BuildResult};

/// A secret id and value handed to the build driver.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub id: String,
    pub value: String,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("id", &self.id)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Fetch every referenced secret.
///
/// A `name` secret binds the whole value. A `maps` secret must be a JSON
/// object; each subkey named in `maps` is bound to the id it maps to. Optional secrets that are
/// unavailable, or whose subkeys are missing, are skipped with a warning.
pub async fn resolve_secrets(
    stores: &SecretStores,
    secrets: &[SecretRef],
    cancel: &CancellationToken,
) -> BuildResult<Vec<ResolvedSecret>> {
    let mut resolved = Vec::new();
    for secret in secrets {
        secret.validate()?;

        let raw = match cancellable(cancel, stores.get(secret)).await {
            Ok(raw) => raw,
            Err(e @ (Error::Config(_) | Error::Cancelled)) => return Err(e.into()),
            Err(e) if secret.optional => {
                warn!(provider = %secret.provider, path = %secret.path, error = %e, "Optional secret not found");
                continue;
            }
            Err(e) => {
                return Err(BuildError::SecretUnavailable {
                    provider: secret.provider.clone(),
                    path: secret.path.clone(),
                    message: e.to_string(),
                });
            }
        };

        if let Some(name) = &secret.name {
            info!(earthly_id = %name, "Adding secret");
            resolved.push(ResolvedSecret {
                id: name.clone(),
                value: raw,
            });
            continue;
        }

        let values: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| BuildError::SecretFormat {
                path: secret.path.clone(),
                message: format!("expected a JSON object: {}", e),
            })?;

        for (key, id) in &secret.maps {
            let value = match values.get(key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Bool(b)) => b.to_string(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                Some(other) => {
                    return Err(BuildError::SecretFormat {
                        path: secret.path.clone(),
                        message: format!("key {} is not a scalar: {}", key, other),
                    });
                }
                None if secret.optional => {
                    warn!(path = %secret.path, key = %key, "Optional secret key not found");
                    continue;
                }
                None => {
                    return Err(BuildError::SecretFormat {
                        path: secret.path.clone(),
                        message: format!("key {} not found", key),
                    });
                }
            };
            info!(earthly_id = %id, "Adding secret");
            resolved.push(ResolvedSecret {
                id: id.clone(),
                value,
            });
        }
    }
    Ok(resolved)
}

/// Encode secrets for the `EARTHLY_SECRETS` environment variable.
pub fn earthly_secrets_env(secrets: &[ResolvedSecret]) -> String {
    secrets
        .iter()
        .map(|s| format!("{}={}", s.id, s.value))
        .collect::<Vec<_>>()
        .join(",")
}
