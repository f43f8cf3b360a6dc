/// Cluster API lifecycle driver
///
/// `Driver` holds every client the lifecycle operations need. It is built once
/// at the process boundary and shared; operations on different clusters do not
/// touch any shared mutable state.
pub mod cluster;
pub mod nodegroup;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::capi::{ManifestBuilder, ObservedObject, ResourceFacade, ResourceKind};
use crate::error::Result;
use crate::keystone::{Credential, CredentialManager};
use crate::model::{Cluster, NodeGroup};
use crate::store::ClusterStore;

/// Combination of server type, OS and COE this driver handles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub server_type: &'static str,
    pub os: &'static str,
    pub coe: &'static str,
}

/// Lifecycle driver for Cluster API backed clusters
#[derive(Clone)]
pub struct Driver {
    resources: Arc<dyn ResourceFacade>,
    credentials: CredentialManager,
    store: Arc<dyn ClusterStore>,
    manifests: ManifestBuilder,
}

impl Driver {
    pub fn new(
        resources: Arc<dyn ResourceFacade>,
        credentials: CredentialManager,
        store: Arc<dyn ClusterStore>,
        manifests: ManifestBuilder,
    ) -> Self {
        Self {
            resources,
            credentials,
            store,
            manifests,
        }
    }

    /// Platforms this driver can provision
    pub fn provides() -> Vec<Capability> {
        vec![Capability {
            server_type: "vm",
            os: "ubuntu-focal",
            coe: "kubernetes",
        }]
    }

    async fn apply(
        &self,
        kind: ResourceKind,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
        credential: Option<&Credential>,
    ) -> Result<()> {
        let manifest = self.manifests.build(kind, cluster, nodegroup, credential)?;
        debug!(cluster = %cluster.uuid, kind = %kind, name = %manifest.target.name, "Applying");
        self.resources.apply(&manifest).await
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
    ) -> Result<()> {
        let target = self.manifests.target(kind, cluster, nodegroup)?;
        debug!(cluster = %cluster.uuid, kind = %kind, name = %target.name, "Deleting");
        self.resources.delete(&target).await
    }

    async fn get(
        &self,
        kind: ResourceKind,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
    ) -> Result<ObservedObject> {
        let target = self.manifests.target(kind, cluster, nodegroup)?;
        self.resources.get(&target).await
    }

    async fn exists(&self, kind: ResourceKind, cluster: &Cluster) -> Result<bool> {
        let target = self.manifests.target(kind, cluster, None)?;
        self.resources.exists(&target).await
    }
}
