/// Whole-cluster create and delete sequencing
use tracing::info;

use super::Driver;
use crate::capi::resources::ResourceKind;
use crate::error::{Error, Result};
use crate::model::{Cluster, NodeGroup};

impl Driver {
    /// Apply every resource a new cluster needs, in dependency order
    ///
    /// Each step is an idempotent upsert. A failure leaves earlier resources in
    /// place and the whole call can be repeated.
    pub async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        info!(cluster = %cluster.uuid, name = %cluster.name, "Creating cluster");

        self.apply(ResourceKind::Namespace, cluster, None, None).await?;

        self.apply(ResourceKind::CloudControllerManagerConfig, cluster, None, None)
            .await?;
        self.apply(ResourceKind::CloudControllerManagerResourceSet, cluster, None, None)
            .await?;

        let network_driver = cluster.cluster_template.network_driver;
        if network_driver.requires_addon() {
            info!(cluster = %cluster.uuid, driver = %network_driver, "Installing CNI add-on");
            self.apply(ResourceKind::CniConfig, cluster, None, None).await?;
            self.apply(ResourceKind::CniResourceSet, cluster, None, None).await?;
        }

        // An existing secret already carries the cluster's live credential
        if self.exists(ResourceKind::CloudConfigSecret, cluster).await? {
            info!(cluster = %cluster.uuid, "Cloud config secret present, keeping its credential");
        } else {
            let credential = self.credentials.issue(&cluster.user_id, cluster.uuid).await?;
            self.apply(ResourceKind::CloudConfigSecret, cluster, None, Some(&credential))
                .await?;
        }

        for kind in ResourceKind::CERTIFICATE_AUTHORITIES {
            self.apply(kind, cluster, None, None).await?;
        }

        let mut worker_template_applied = false;
        for nodegroup in &cluster.nodegroups {
            let apply_worker_template = !nodegroup.is_master() && !worker_template_applied;
            self.provision(cluster, nodegroup, apply_worker_template).await?;
            worker_template_applied |= apply_worker_template;
        }

        self.apply(ResourceKind::OpenStackCluster, cluster, None, None).await?;
        self.apply(ResourceKind::Cluster, cluster, None, None).await?;

        info!(cluster = %cluster.uuid, "Cluster resources applied");
        Ok(())
    }

    /// Start teardown of a cluster
    ///
    /// The credential and certificate authority secrets stay until the
    /// reconciler has removed the cluster, see `update_cluster_status`.
    pub async fn delete_cluster(&self, cluster: &Cluster) -> Result<()> {
        info!(cluster = %cluster.uuid, name = %cluster.name, "Deleting cluster");

        self.delete(ResourceKind::Cluster, cluster, None).await?;
        self.delete(ResourceKind::OpenStackCluster, cluster, None).await?;

        for nodegroup in &cluster.nodegroups {
            self.delete_nodegroup(cluster, nodegroup).await?;
        }

        Ok(())
    }

    pub async fn update_cluster(&self, _cluster: &Cluster) -> Result<()> {
        Err(Error::unsupported("update_cluster"))
    }

    pub async fn resize_cluster(
        &self,
        _cluster: &Cluster,
        _node_count: u32,
        _nodes_to_remove: &[String],
        _nodegroup: Option<&NodeGroup>,
    ) -> Result<()> {
        Err(Error::unsupported("resize_cluster"))
    }

    pub async fn upgrade_cluster(
        &self,
        _cluster: &Cluster,
        _kube_tag: &str,
        _max_batch_size: u32,
        _nodegroup: Option<&NodeGroup>,
    ) -> Result<()> {
        Err(Error::unsupported("upgrade_cluster"))
    }

    pub async fn create_federation(&self, _name: &str) -> Result<()> {
        Err(Error::unsupported("create_federation"))
    }

    pub async fn update_federation(&self, _name: &str) -> Result<()> {
        Err(Error::unsupported("update_federation"))
    }

    pub async fn delete_federation(&self, _name: &str) -> Result<()> {
        Err(Error::unsupported("delete_federation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{harness, Call};
    use crate::keystone::CredentialBackend;
    use crate::model::{NetworkDriver, NodeGroupRole};

    fn position(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
        calls.iter().position(pred).unwrap()
    }

    fn applied(kind: &'static str) -> impl Fn(&Call) -> bool {
        move |call: &Call| matches!(call, Call::Apply(target) if target.kind == kind)
    }

    #[tokio::test]
    async fn test_create_orders_prerequisites() {
        let h = harness();
        h.driver.create_cluster(&h.cluster).await.unwrap();
        let calls = h.facade.calls();

        let namespace = position(&calls, applied("Namespace"));
        let first_secret = position(&calls, applied("Secret"));
        let credential = position(&calls, |c| matches!(c, Call::CreateCredential(_)));
        let cloud_config = position(&calls, |c| {
            matches!(c, Call::Apply(t) if t.name.ends_with("-cloud-config"))
        });
        let last_ca = calls
            .iter()
            .rposition(|c| matches!(c, Call::Apply(t) if t.name.ends_with("-sa")))
            .unwrap();
        let capi_cluster = position(&calls, applied("Cluster"));
        let control_plane = position(&calls, applied("KubeadmControlPlane"));

        assert!(namespace < first_secret);
        assert!(credential < cloud_config);
        assert!(credential < control_plane);
        assert!(last_ca < capi_cluster);
        assert!(control_plane < capi_cluster);
        assert_eq!(capi_cluster, calls.len() - 1);
        assert_eq!(
            h.facade.applied_kinds()[h.facade.applied_kinds().len() - 2],
            "OpenStackCluster"
        );
    }

    #[tokio::test]
    async fn test_create_calico_with_three_node_groups() {
        let mut h = harness();
        h.cluster
            .nodegroups
            .push(NodeGroup::new("extra-worker", NodeGroupRole::Worker, 1));
        let cluster = h.cluster.clone();
        assert_eq!(cluster.masters().count(), 1);
        assert_eq!(cluster.workers().count(), 2);

        h.driver.create_cluster(&cluster).await.unwrap();
        let calls = h.facade.calls();

        let credentials: Vec<&Call> = calls
            .iter()
            .filter(|c| matches!(c, Call::CreateCredential(_)))
            .collect();
        assert_eq!(credentials, vec![&Call::CreateCredential(cluster.uuid.to_string())]);

        let cni_name = format!("{}-calico", cluster.uuid);
        let cni = h
            .facade
            .applied()
            .into_iter()
            .filter(|t| t.name == cni_name)
            .count();
        assert_eq!(cni, 2);

        let kinds = h.facade.applied_kinds();
        let count = |kind: &str| kinds.iter().filter(|k| *k == kind).count();
        assert_eq!(count("OpenStackMachineTemplate"), 3);
        assert_eq!(count("KubeadmControlPlane"), 1);
        assert_eq!(count("MachineDeployment"), 2);
        assert_eq!(count("KubeadmConfigTemplate"), 1);
    }

    #[tokio::test]
    async fn test_create_without_addon_skips_cni() {
        let mut h = harness();
        h.cluster.cluster_template.network_driver = NetworkDriver::Flannel;
        let cluster = h.cluster.clone();

        h.driver.create_cluster(&cluster).await.unwrap();

        let cni_name = format!("{}-flannel", cluster.uuid);
        assert!(h.facade.applied().iter().all(|t| t.name != cni_name));
    }

    #[tokio::test]
    async fn test_create_twice_converges() {
        let h = harness();
        h.driver.create_cluster(&h.cluster).await.unwrap();
        let objects = h.facade.objects();

        h.facade.clear_calls();
        h.driver.create_cluster(&h.cluster).await.unwrap();

        assert_eq!(h.facade.objects(), objects);
        assert!(!h.facade.calls().iter().any(|c| matches!(
            c,
            Call::CreateCredential(_) | Call::DeleteCredential(_)
        )));
        assert_eq!(h.credentials.names(), vec![h.cluster.uuid.to_string()]);

        let master = h.cluster.masters().next();
        let control_plane = h.target(ResourceKind::KubeadmControlPlane, &h.cluster, master);
        let body = objects[&control_plane].to_string();
        assert!(body.contains("contentFrom"));
        assert!(!body.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_create_replaces_credential_left_without_secret() {
        let h = harness();
        let name = h.cluster.uuid.to_string();
        h.credentials
            .create_application_credential(&h.cluster.user_id, &name, "interrupted")
            .await
            .unwrap();
        h.facade.clear_calls();

        h.driver.create_cluster(&h.cluster).await.unwrap();

        let credential_calls: Vec<Call> = h
            .facade
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateCredential(_) | Call::DeleteCredential(_)))
            .collect();
        assert_eq!(
            credential_calls,
            vec![Call::DeleteCredential(name.clone()), Call::CreateCredential(name.clone())]
        );
        assert_eq!(h.credentials.names(), vec![name]);

        let secret = h.target(ResourceKind::CloudConfigSecret, &h.cluster, None);
        let cloud_conf = h.facade.objects()[&secret]["stringData"]["cloud.conf"].to_string();
        assert!(cloud_conf.contains("cred-2"));
    }

    #[tokio::test]
    async fn test_create_fails_without_ca_material() {
        let mut h = harness();
        h.cluster.certificate_authorities.etcd = None;

        let err = h.driver.create_cluster(&h.cluster).await.unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));

        // earlier resources stay in place
        let namespace = h.target(ResourceKind::Namespace, &h.cluster, None);
        assert!(h.facade.contains(&namespace));
        let capi_cluster = h.target(ResourceKind::Cluster, &h.cluster, None);
        assert!(!h.facade.contains(&capi_cluster));
    }

    #[tokio::test]
    async fn test_delete_removes_cluster_objects_first() {
        let h = harness();
        h.driver.create_cluster(&h.cluster).await.unwrap();
        h.facade.clear_calls();

        h.driver.delete_cluster(&h.cluster).await.unwrap();

        let deleted: Vec<String> = h
            .facade
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(t) => Some(t.kind),
                _ => None,
            })
            .collect();
        assert_eq!(deleted[0], "Cluster");
        assert_eq!(deleted[1], "OpenStackCluster");
        assert!(!deleted.iter().any(|k| k == "Secret"));
        assert!(h.credentials.names().len() == 1);

        let api_ca = h.target(ResourceKind::ApiCertificateAuthority, &h.cluster, None);
        assert!(h.facade.contains(&api_ca));
    }

    #[tokio::test]
    async fn test_unsupported_operations_have_no_side_effects() {
        let h = harness();
        let cluster = h.cluster.clone();

        let results = [
            h.driver.update_cluster(&cluster).await,
            h.driver.resize_cluster(&cluster, 5, &[], None).await,
            h.driver.upgrade_cluster(&cluster, "v1.24.0", 1, None).await,
            h.driver.create_federation("fed").await,
            h.driver.update_federation("fed").await,
            h.driver.delete_federation("fed").await,
        ];

        for result in results {
            assert!(matches!(result, Err(Error::UnsupportedOperation { .. })));
        }
        assert!(h.facade.calls().is_empty());
        assert!(h.store.cluster(cluster.uuid).is_none());
    }
}
