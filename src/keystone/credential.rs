/// Application credential lifecycle for clusters
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use super::models::ApplicationCredential;
use crate::error::{Error, Result};

/// Identity service operations the credential manager depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Create an application credential owned by `user_id`
    async fn create_application_credential(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ApplicationCredential>;

    /// Find an application credential by name, `NotFound` when absent
    async fn find_application_credential(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<ApplicationCredential>;

    /// Delete an application credential by id
    async fn delete_application_credential(&self, user_id: &str, id: &str) -> Result<()>;
}

/// Scoped credential handed to in-cluster cloud integration
#[derive(Clone)]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub secret: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Issues and revokes the per-cluster application credential
#[derive(Clone)]
pub struct CredentialManager {
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialManager {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Create the credential named after the cluster
    pub async fn issue(&self, user_id: &str, cluster_id: Uuid) -> Result<Credential> {
        let name = cluster_id.to_string();
        let description = format!("Magnum cluster ({})", cluster_id);

        // The secret is only returned on creation, so a leftover credential
        // from an interrupted create is replaced rather than reused
        match self.backend.find_application_credential(user_id, &name).await {
            Ok(stale) => {
                warn!(cluster = %cluster_id, credential = %stale.id, "Replacing existing application credential");
                self.backend
                    .delete_application_credential(user_id, &stale.id)
                    .await?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let created = self
            .backend
            .create_application_credential(user_id, &name, &description)
            .await?;

        let secret = created.secret.ok_or_else(|| {
            Error::auth_backend(format!(
                "application credential {} was created without a secret",
                created.id
            ))
        })?;

        info!(cluster = %cluster_id, credential = %created.id, "Issued application credential");

        Ok(Credential {
            id: created.id,
            name: created.name,
            secret,
        })
    }

    /// Find and delete the cluster's credential
    ///
    /// A credential that no longer exists counts as revoked.
    pub async fn revoke(&self, user_id: &str, cluster_id: Uuid) -> Result<()> {
        let name = cluster_id.to_string();

        let credential = match self.backend.find_application_credential(user_id, &name).await {
            Ok(credential) => credential,
            Err(e) if e.is_not_found() => {
                info!(cluster = %cluster_id, "No application credential found, nothing to revoke");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match self
            .backend
            .delete_application_credential(user_id, &credential.id)
            .await
        {
            Ok(()) => {
                info!(cluster = %cluster_id, credential = %credential.id, "Revoked application credential");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
