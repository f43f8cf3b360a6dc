/// Cluster API resource kinds and object naming
use std::fmt;

use crate::error::{Error, Result};
use crate::model::{Cluster, NodeGroup};

pub const CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
pub const CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta1";
pub const BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1beta1";
pub const ADDONS_API_VERSION: &str = "addons.cluster.x-k8s.io/v1beta1";
pub const OPENSTACK_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1alpha5";

/// Every external resource the driver applies or deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespace,
    CloudControllerManagerConfig,
    CloudControllerManagerResourceSet,
    CniConfig,
    CniResourceSet,
    CloudConfigSecret,
    ApiCertificateAuthority,
    EtcdCertificateAuthority,
    FrontProxyCertificateAuthority,
    ServiceAccountCertificateAuthority,
    OpenStackMachineTemplate,
    KubeadmControlPlane,
    KubeadmConfigTemplate,
    MachineDeployment,
    Cluster,
    OpenStackCluster,
}

impl ResourceKind {
    /// Secrets holding the cluster's certificate authorities
    pub const CERTIFICATE_AUTHORITIES: [ResourceKind; 4] = [
        ResourceKind::ApiCertificateAuthority,
        ResourceKind::EtcdCertificateAuthority,
        ResourceKind::FrontProxyCertificateAuthority,
        ResourceKind::ServiceAccountCertificateAuthority,
    ];

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Namespace
            | ResourceKind::CloudControllerManagerConfig
            | ResourceKind::CniConfig
            | ResourceKind::CloudConfigSecret
            | ResourceKind::ApiCertificateAuthority
            | ResourceKind::EtcdCertificateAuthority
            | ResourceKind::FrontProxyCertificateAuthority
            | ResourceKind::ServiceAccountCertificateAuthority => "v1",
            ResourceKind::CloudControllerManagerResourceSet | ResourceKind::CniResourceSet => {
                ADDONS_API_VERSION
            }
            ResourceKind::OpenStackMachineTemplate | ResourceKind::OpenStackCluster => {
                OPENSTACK_API_VERSION
            }
            ResourceKind::KubeadmControlPlane => CONTROL_PLANE_API_VERSION,
            ResourceKind::KubeadmConfigTemplate => BOOTSTRAP_API_VERSION,
            ResourceKind::MachineDeployment | ResourceKind::Cluster => CLUSTER_API_VERSION,
        }
    }

    /// Kubernetes `kind` of the object
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::CloudControllerManagerConfig | ResourceKind::CniConfig => "ConfigMap",
            ResourceKind::CloudControllerManagerResourceSet | ResourceKind::CniResourceSet => {
                "ClusterResourceSet"
            }
            ResourceKind::CloudConfigSecret
            | ResourceKind::ApiCertificateAuthority
            | ResourceKind::EtcdCertificateAuthority
            | ResourceKind::FrontProxyCertificateAuthority
            | ResourceKind::ServiceAccountCertificateAuthority => "Secret",
            ResourceKind::OpenStackMachineTemplate => "OpenStackMachineTemplate",
            ResourceKind::KubeadmControlPlane => "KubeadmControlPlane",
            ResourceKind::KubeadmConfigTemplate => "KubeadmConfigTemplate",
            ResourceKind::MachineDeployment => "MachineDeployment",
            ResourceKind::Cluster => "Cluster",
            ResourceKind::OpenStackCluster => "OpenStackCluster",
        }
    }

    /// Reference to the object this kind maps to for a cluster (and node group)
    pub fn object_ref(
        &self,
        namespace: &str,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
    ) -> Result<ObjectRef> {
        let uuid = cluster.uuid;

        let name = match self {
            ResourceKind::Namespace => {
                return Ok(ObjectRef::cluster_scoped(
                    self.api_version(),
                    self.kind(),
                    namespace,
                ))
            }
            ResourceKind::CloudControllerManagerConfig
            | ResourceKind::CloudControllerManagerResourceSet => {
                format!("{}-cloud-controller-manager", uuid)
            }
            ResourceKind::CniConfig | ResourceKind::CniResourceSet => {
                format!("{}-{}", uuid, cluster.cluster_template.network_driver)
            }
            ResourceKind::CloudConfigSecret => cloud_config_secret_name(cluster),
            ResourceKind::ApiCertificateAuthority => format!("{}-ca", uuid),
            ResourceKind::EtcdCertificateAuthority => format!("{}-etcd", uuid),
            ResourceKind::FrontProxyCertificateAuthority => format!("{}-proxy", uuid),
            ResourceKind::ServiceAccountCertificateAuthority => format!("{}-sa", uuid),
            ResourceKind::OpenStackMachineTemplate
            | ResourceKind::KubeadmControlPlane
            | ResourceKind::MachineDeployment => {
                let nodegroup = nodegroup.ok_or_else(|| {
                    Error::malformed(
                        self.kind(),
                        format!("a node group is required to name {}", self.kind()),
                    )
                })?;
                nodegroup_object_name(cluster, nodegroup)
            }
            ResourceKind::KubeadmConfigTemplate
            | ResourceKind::Cluster
            | ResourceKind::OpenStackCluster => uuid.to_string(),
        };

        Ok(ObjectRef::namespaced(
            self.api_version(),
            self.kind(),
            name,
            namespace,
        ))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Name shared by a node group's machine template, control plane or deployment
pub fn nodegroup_object_name(cluster: &Cluster, nodegroup: &NodeGroup) -> String {
    format!("{}-{}", cluster.uuid, nodegroup.name)
}

pub fn cloud_config_secret_name(cluster: &Cluster) -> String {
    format!("{}-cloud-config", cluster.uuid)
}

/// Identifies a single Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Split the apiVersion into (group, version); core resources have an empty group
    pub fn group_version(&self) -> (String, String) {
        match self.api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), self.api_version.clone()),
        }
    }

    /// Lowercase plural resource name
    pub fn plural(&self) -> String {
        format!("{}s", self.kind.to_lowercase())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} ({})", self.kind, self.name, ns),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeGroupRole;

    #[test]
    fn test_cluster_level_names() {
        let cluster = Cluster::example();
        let uuid = cluster.uuid.to_string();

        let target = ResourceKind::Cluster
            .object_ref("magnum-system", &cluster, None)
            .unwrap();
        assert_eq!(target.name, uuid);
        assert_eq!(target.namespace.as_deref(), Some("magnum-system"));

        let target = ResourceKind::CniConfig
            .object_ref("magnum-system", &cluster, None)
            .unwrap();
        assert_eq!(target.name, format!("{}-calico", uuid));
        assert_eq!(target.kind, "ConfigMap");

        let target = ResourceKind::EtcdCertificateAuthority
            .object_ref("magnum-system", &cluster, None)
            .unwrap();
        assert_eq!(target.name, format!("{}-etcd", uuid));
    }

    #[test]
    fn test_namespace_is_cluster_scoped() {
        let cluster = Cluster::example();
        let target = ResourceKind::Namespace
            .object_ref("magnum-system", &cluster, None)
            .unwrap();
        assert_eq!(target.name, "magnum-system");
        assert!(target.namespace.is_none());
        assert_eq!(target.group_version(), (String::new(), "v1".to_string()));
        assert_eq!(target.plural(), "namespaces");
    }

    #[test]
    fn test_nodegroup_kinds_require_nodegroup() {
        let cluster = Cluster::example();
        let err = ResourceKind::MachineDeployment
            .object_ref("magnum-system", &cluster, None)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));

        let nodegroup = NodeGroup::new("pool-a", NodeGroupRole::Worker, 3);
        let target = ResourceKind::MachineDeployment
            .object_ref("magnum-system", &cluster, Some(&nodegroup))
            .unwrap();
        assert_eq!(target.name, format!("{}-pool-a", cluster.uuid));
        assert_eq!(
            target.group_version(),
            ("cluster.x-k8s.io".to_string(), "v1beta1".to_string())
        );
        assert_eq!(target.plural(), "machinedeployments");
    }

    #[test]
    fn test_worker_config_template_is_shared() {
        let cluster = Cluster::example();
        let a = NodeGroup::new("pool-a", NodeGroupRole::Worker, 1);
        let b = NodeGroup::new("pool-b", NodeGroupRole::Worker, 1);
        let ref_a = ResourceKind::KubeadmConfigTemplate
            .object_ref("ns", &cluster, Some(&a))
            .unwrap();
        let ref_b = ResourceKind::KubeadmConfigTemplate
            .object_ref("ns", &cluster, Some(&b))
            .unwrap();
        assert_eq!(ref_a, ref_b);
    }
}
