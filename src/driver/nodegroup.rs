/// Node group provisioning, teardown and status derivation
use tracing::{debug, info, warn};

use super::Driver;
use crate::capi::resources::ResourceKind;
use crate::capi::status::{ControlPlaneObservation, MachineDeploymentObservation, MachineDeploymentPhase};
use crate::error::{Error, Result};
use crate::model::{Action, Cluster, LifecycleStatus, NodeGroup, NodeGroupRole, Phase};

/// New status for a worker group given its deployment phase
///
/// The action is kept from the current status. `None` means the phase is
/// outside the known set and no decision is made.
pub fn worker_status(
    current: LifecycleStatus,
    phase: &MachineDeploymentPhase,
) -> Option<LifecycleStatus> {
    match phase {
        MachineDeploymentPhase::ScalingUp | MachineDeploymentPhase::ScalingDown => {
            Some(current.with_phase(Phase::InProgress))
        }
        MachineDeploymentPhase::Running => Some(current.with_phase(Phase::Complete)),
        MachineDeploymentPhase::Failed | MachineDeploymentPhase::Unknown => {
            Some(current.with_phase(Phase::Failed))
        }
        MachineDeploymentPhase::Other(_) => None,
    }
}

impl Driver {
    /// Apply a node group's machine template followed by its role specific objects
    ///
    /// With `apply_worker_template` unset the shared worker bootstrap template
    /// is assumed to be in place already.
    pub(crate) async fn provision(
        &self,
        cluster: &Cluster,
        nodegroup: &NodeGroup,
        apply_worker_template: bool,
    ) -> Result<()> {
        info!(cluster = %cluster.uuid, nodegroup = %nodegroup.name, role = %nodegroup.role, "Provisioning node group");

        self.apply(ResourceKind::OpenStackMachineTemplate, cluster, Some(nodegroup), None)
            .await?;

        match nodegroup.role {
            NodeGroupRole::Master => {
                self.apply(ResourceKind::KubeadmControlPlane, cluster, Some(nodegroup), None)
                    .await?;
            }
            NodeGroupRole::Worker => {
                if apply_worker_template {
                    self.apply(ResourceKind::KubeadmConfigTemplate, cluster, None, None)
                        .await?;
                }
                self.apply(ResourceKind::MachineDeployment, cluster, Some(nodegroup), None)
                    .await?;
            }
        }

        Ok(())
    }

    /// Provision a single node group on an existing cluster
    pub async fn create_nodegroup(&self, cluster: &Cluster, nodegroup: &NodeGroup) -> Result<()> {
        self.provision(cluster, nodegroup, true).await
    }

    /// Record a new node group on an existing cluster and provision it
    ///
    /// A cluster whose last operation has finished moves to
    /// UPDATE_IN_PROGRESS, so status passes poll the new group.
    pub async fn add_nodegroup(&self, cluster: &mut Cluster, nodegroup: NodeGroup) -> Result<()> {
        if cluster.status.action == Action::Delete {
            return Err(Error::unsupported("create_nodegroup on a deleted cluster"));
        }

        if cluster.status.is_terminal() {
            info!(cluster = %cluster.uuid, from = %cluster.status, "Cluster moves to UPDATE_IN_PROGRESS");
            cluster.status = LifecycleStatus::UPDATE_IN_PROGRESS;
        }
        cluster.nodegroups.push(nodegroup.clone());
        self.store.save_cluster(cluster).await?;

        self.create_nodegroup(cluster, &nodegroup).await
    }

    /// Observe the node group's reconciled object and derive its new status
    ///
    /// The updated node group is persisted before it is returned.
    pub async fn update_nodegroup_status(
        &self,
        cluster: &Cluster,
        nodegroup: &NodeGroup,
    ) -> Result<NodeGroup> {
        let mut updated = nodegroup.clone();

        match nodegroup.role {
            NodeGroupRole::Master => {
                let observed = self
                    .get(ResourceKind::KubeadmControlPlane, cluster, Some(nodegroup))
                    .await?;
                let control_plane = ControlPlaneObservation::decode(&observed)?;

                if control_plane.ready {
                    updated.status = nodegroup.status.with_phase(Phase::Complete);
                } else {
                    debug!(cluster = %cluster.uuid, nodegroup = %nodegroup.name, "Control plane not ready yet");
                }
                updated.status_reason = control_plane.failure_message;
            }
            NodeGroupRole::Worker => {
                let observed = self
                    .get(ResourceKind::MachineDeployment, cluster, Some(nodegroup))
                    .await?;
                let deployment = MachineDeploymentObservation::decode(&observed)?;

                match worker_status(nodegroup.status, &deployment.phase) {
                    Some(status) => updated.status = status,
                    None => warn!(
                        cluster = %cluster.uuid,
                        nodegroup = %nodegroup.name,
                        phase = %deployment.phase,
                        "Unrecognized machine deployment phase, leaving status unchanged"
                    ),
                }
            }
        }

        if updated.status != nodegroup.status {
            info!(
                cluster = %cluster.uuid,
                nodegroup = %nodegroup.name,
                from = %nodegroup.status,
                to = %updated.status,
                "Node group status changed"
            );
        }

        self.store.save_nodegroup(cluster.uuid, &updated).await?;
        Ok(updated)
    }

    /// Remove a node group's objects; the machine template goes last
    pub async fn delete_nodegroup(&self, cluster: &Cluster, nodegroup: &NodeGroup) -> Result<()> {
        info!(cluster = %cluster.uuid, nodegroup = %nodegroup.name, "Deleting node group");

        match nodegroup.role {
            NodeGroupRole::Master => {
                self.delete(ResourceKind::KubeadmControlPlane, cluster, Some(nodegroup))
                    .await?;
            }
            NodeGroupRole::Worker => {
                self.delete(ResourceKind::MachineDeployment, cluster, Some(nodegroup))
                    .await?;
                self.delete(ResourceKind::KubeadmConfigTemplate, cluster, None)
                    .await?;
            }
        }

        self.delete(ResourceKind::OpenStackMachineTemplate, cluster, Some(nodegroup))
            .await
    }

    pub async fn update_nodegroup(&self, _cluster: &Cluster, _nodegroup: &NodeGroup) -> Result<()> {
        Err(Error::unsupported("update_nodegroup"))
    }
}
