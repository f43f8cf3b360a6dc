/// Idempotent apply/delete/get over Cluster API resources
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

use super::manifests::Manifest;
use super::resources::ObjectRef;
use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "capi-driver";

/// Freshly fetched state of an external object
#[derive(Debug, Clone)]
pub struct ObservedObject {
    pub target: ObjectRef,
    pub data: serde_json::Value,
}

impl ObservedObject {
    /// Decode into a typed view, reporting shape mismatches as malformed state
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| Error::malformed(self.target.to_string(), e.to_string()))
    }
}

/// Uniform contract over the resources the driver manages
///
/// `apply` must be an idempotent upsert and `delete` must treat an absent
/// object as success, since recovery from a partial failure is re-running the
/// whole sequence.
#[async_trait]
pub trait ResourceFacade: Send + Sync {
    /// Create or update the object so it matches the manifest
    async fn apply(&self, manifest: &Manifest) -> Result<()>;

    /// Remove the object, succeeding if it is already gone
    async fn delete(&self, target: &ObjectRef) -> Result<()>;

    /// Fetch current observed state, `NotFound` if the object does not exist
    async fn get(&self, target: &ObjectRef) -> Result<ObservedObject>;

    async fn exists(&self, target: &ObjectRef) -> Result<bool> {
        match self.get(target).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Facade backed by the management cluster's Kubernetes API
#[derive(Clone)]
pub struct KubeResourceFacade {
    client: Client,
}

impl KubeResourceFacade {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or the ambient configuration
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Config(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| Error::Config(format!("failed to load kubeconfig: {}", e)))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };

        Ok(Self::new(client))
    }

    fn api(&self, target: &ObjectRef) -> Api<DynamicObject> {
        let (group, version) = target.group_version();
        let ar = ApiResource {
            group,
            version,
            api_version: target.api_version.clone(),
            kind: target.kind.clone(),
            plural: target.plural(),
        };

        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl ResourceFacade for KubeResourceFacade {
    async fn apply(&self, manifest: &Manifest) -> Result<()> {
        let obj: DynamicObject = serde_json::from_value(manifest.to_value())?;

        self.api(&manifest.target)
            .patch(
                &manifest.target.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&obj),
            )
            .await?;

        info!(target = %manifest.target, "Applied resource");
        Ok(())
    }

    async fn delete(&self, target: &ObjectRef) -> Result<()> {
        match self
            .api(target)
            .delete(&target.name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(target = %target, "Deleted resource");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(target = %target, "Resource not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, target: &ObjectRef) -> Result<ObservedObject> {
        match self.api(target).get(&target.name).await {
            Ok(obj) => Ok(ObservedObject {
                target: target.clone(),
                data: serde_json::to_value(&obj)?,
            }),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::not_found(&target.kind, &target.name))
            }
            Err(e) => Err(e.into()),
        }
    }
}
