/// Folding the reconciled object graph into cluster lifecycle status
use tracing::{debug, info};

use super::Driver;
use crate::capi::resources::ResourceKind;
use crate::capi::status::{CapiClusterObservation, ControlPlaneObservation};
use crate::error::Result;
use crate::model::{Action, Cluster, Phase};

impl Driver {
    /// Run one reconciliation pass for a cluster
    ///
    /// Meant to be called repeatedly while the cluster's status is in progress.
    /// Terminal clusters are left alone.
    pub async fn update_cluster_status(&self, cluster: &mut Cluster) -> Result<()> {
        match (cluster.status.action, cluster.status.phase) {
            (Action::Create | Action::Update, Phase::InProgress) => {
                self.reconcile_provisioning(cluster).await
            }
            (Action::Delete, Phase::InProgress) => self.reconcile_teardown(cluster).await,
            _ => {
                debug!(cluster = %cluster.uuid, status = %cluster.status, "Nothing to reconcile");
                Ok(())
            }
        }
    }

    async fn reconcile_provisioning(&self, cluster: &mut Cluster) -> Result<()> {
        let observed = self.get(ResourceKind::Cluster, cluster, None).await?;
        let capi_cluster = CapiClusterObservation::decode(&observed)?;

        if !capi_cluster.control_plane_ready() {
            debug!(cluster = %cluster.uuid, "Waiting for ControlPlaneReady");
            return Ok(());
        }

        let api_address = capi_cluster.api_address()?;

        for index in 0..cluster.nodegroups.len() {
            let nodegroup = self
                .update_nodegroup_status(cluster, &cluster.nodegroups[index])
                .await?;
            let complete = nodegroup.status.is_complete();
            cluster.nodegroups[index] = nodegroup;

            if !complete {
                debug!(
                    cluster = %cluster.uuid,
                    nodegroup = %cluster.nodegroups[index].name,
                    status = %cluster.nodegroups[index].status,
                    "Waiting for node group"
                );
                return Ok(());
            }
        }

        let mut coe_version = None;
        for master in cluster.masters() {
            let observed = self
                .get(ResourceKind::KubeadmControlPlane, cluster, Some(master))
                .await?;
            let control_plane = ControlPlaneObservation::decode(&observed)?;
            coe_version = Some(control_plane.version()?.to_string());
        }

        cluster.api_address = Some(api_address);
        if coe_version.is_some() {
            cluster.coe_version = coe_version;
        }
        let previous = cluster.status;
        cluster.status = cluster.status.with_phase(Phase::Complete);

        info!(
            cluster = %cluster.uuid,
            from = %previous,
            to = %cluster.status,
            api_address = ?cluster.api_address,
            coe_version = ?cluster.coe_version,
            "Cluster reconciled"
        );

        self.store.save_cluster(cluster).await
    }

    async fn reconcile_teardown(&self, cluster: &mut Cluster) -> Result<()> {
        if self.exists(ResourceKind::Cluster, cluster).await? {
            debug!(cluster = %cluster.uuid, "Waiting for the reconciler to remove the cluster");
            return Ok(());
        }

        // Revoked only now so the reconciler keeps cloud access during teardown
        self.credentials
            .revoke(&cluster.user_id, cluster.uuid)
            .await?;

        self.delete(ResourceKind::CloudConfigSecret, cluster, None).await?;
        for kind in ResourceKind::CERTIFICATE_AUTHORITIES {
            self.delete(kind, cluster, None).await?;
        }

        cluster.status = cluster.status.with_phase(Phase::Complete);
        info!(cluster = %cluster.uuid, status = %cluster.status, "Cluster deleted");

        self.store.save_cluster(cluster).await
    }
}
