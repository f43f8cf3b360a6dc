/// Managed cluster and node group records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::status::LifecycleStatus;

/// A managed Kubernetes cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub uuid: Uuid,

    pub name: String,

    /// Owning user, used to scope the application credential
    pub user_id: String,

    pub project_id: String,

    pub status: LifecycleStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,

    /// Kubernetes API endpoint, only known once the control plane is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_address: Option<String>,

    /// Kubernetes version reported by the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coe_version: Option<String>,

    pub cluster_template: ClusterTemplate,

    /// Nova keypair injected into every machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,

    #[serde(default)]
    pub certificate_authorities: CertificateAuthorities,

    pub nodegroups: Vec<NodeGroup>,

    /// Last time the record was persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cluster {
    /// Node groups carrying the control plane
    pub fn masters(&self) -> impl Iterator<Item = &NodeGroup> {
        self.nodegroups
            .iter()
            .filter(|ng| ng.role == NodeGroupRole::Master)
    }

    /// Worker node groups
    pub fn workers(&self) -> impl Iterator<Item = &NodeGroup> {
        self.nodegroups
            .iter()
            .filter(|ng| ng.role == NodeGroupRole::Worker)
    }

    /// Kubernetes version requested through the `kube_tag` label
    pub fn kube_tag(&self) -> &str {
        self.cluster_template
            .labels
            .get("kube_tag")
            .map(String::as_str)
            .unwrap_or(DEFAULT_KUBE_TAG)
    }

    /// Example record used by `init` and in tests
    pub fn example() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: "k8s-cluster".to_string(),
            user_id: "3c1e6e5c2bb04a1a8e0a1e0e5d1f2a31".to_string(),
            project_id: "8f2e7cbe7d9b4b4f9a4c0f8bd0a0c8a2".to_string(),
            status: LifecycleStatus::CREATE_IN_PROGRESS,
            status_reason: None,
            api_address: None,
            coe_version: None,
            cluster_template: ClusterTemplate {
                network_driver: NetworkDriver::Calico,
                image_id: "ubuntu-2004-kube-v1.23.5".to_string(),
                master_flavor_id: "m1.medium".to_string(),
                flavor_id: "m1.large".to_string(),
                external_network_id: "public".to_string(),
                dns_nameserver: "8.8.8.8".to_string(),
                fixed_subnet_cidr: default_fixed_subnet_cidr(),
                labels: BTreeMap::from([("kube_tag".to_string(), DEFAULT_KUBE_TAG.to_string())]),
            },
            keypair: Some("default".to_string()),
            certificate_authorities: CertificateAuthorities::default(),
            nodegroups: vec![
                NodeGroup::new("default-master", NodeGroupRole::Master, 1),
                NodeGroup::new("default-worker", NodeGroupRole::Worker, 2),
            ],
            updated_at: None,
        }
    }
}

const DEFAULT_KUBE_TAG: &str = "v1.23.5";

fn default_fixed_subnet_cidr() -> String {
    "10.0.0.0/24".to_string()
}

/// Template the cluster was created from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTemplate {
    pub network_driver: NetworkDriver,

    pub image_id: String,

    pub master_flavor_id: String,

    pub flavor_id: String,

    pub external_network_id: String,

    pub dns_nameserver: String,

    #[serde(default = "default_fixed_subnet_cidr")]
    pub fixed_subnet_cidr: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Container network driver selected by the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkDriver {
    Calico,
    Flannel,
    Cilium,
}

impl NetworkDriver {
    /// Whether the driver is installed as a ClusterResourceSet add-on
    pub fn requires_addon(&self) -> bool {
        matches!(self, NetworkDriver::Calico)
    }
}

impl fmt::Display for NetworkDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkDriver::Calico => write!(f, "calico"),
            NetworkDriver::Flannel => write!(f, "flannel"),
            NetworkDriver::Cilium => write!(f, "cilium"),
        }
    }
}

/// PEM encoded certificate and key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPair {
    pub certificate: String,
    pub private_key: String,
}

/// The four certificate authorities a kubeadm control plane expects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateAuthorities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<KeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<KeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_proxy: Option<KeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<KeyPair>,
}

/// Role of a node group in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeGroupRole {
    Master,
    Worker,
}

impl fmt::Display for NodeGroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeGroupRole::Master => write!(f, "master"),
            NodeGroupRole::Worker => write!(f, "worker"),
        }
    }
}

/// A pool of identically configured nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub name: String,

    pub role: NodeGroupRole,

    pub node_count: u32,

    /// Overrides the template flavor when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,

    /// Overrides the template image when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    pub status: LifecycleStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

impl NodeGroup {
    pub fn new(name: impl Into<String>, role: NodeGroupRole, node_count: u32) -> Self {
        Self {
            name: name.into(),
            role,
            node_count,
            flavor_id: None,
            image_id: None,
            status: LifecycleStatus::CREATE_IN_PROGRESS,
            status_reason: None,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeGroupRole::Master
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_cluster_roles() {
        let cluster = Cluster::example();
        assert_eq!(cluster.masters().count(), 1);
        assert_eq!(cluster.workers().count(), 1);
        assert_eq!(cluster.kube_tag(), "v1.23.5");
    }

    #[test]
    fn test_only_calico_requires_addon() {
        assert!(NetworkDriver::Calico.requires_addon());
        assert!(!NetworkDriver::Flannel.requires_addon());
        assert!(!NetworkDriver::Cilium.requires_addon());
    }

    #[test]
    fn test_record_parses_legacy_status_strings() {
        let yaml = r#"
uuid: 0b5b7e52-3cb6-4d8c-8a46-7b1a2f1c9f10
name: demo
user_id: u1
project_id: p1
status: UPDATE_IN_PROGRESS
cluster_template:
  network_driver: calico
  image_id: img
  master_flavor_id: m1.medium
  flavor_id: m1.large
  external_network_id: public
  dns_nameserver: 8.8.8.8
nodegroups:
  - name: default-master
    role: master
    node_count: 1
    status: UPDATE_IN_PROGRESS
"#;
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cluster.status, LifecycleStatus::UPDATE_IN_PROGRESS);
        assert!(cluster.nodegroups[0].is_master());
        assert_eq!(cluster.cluster_template.fixed_subnet_cidr, "10.0.0.0/24");
        assert_eq!(cluster.kube_tag(), DEFAULT_KUBE_TAG);
    }

    #[test]
    fn test_record_rejects_status_without_action() {
        let yaml = r#"
name: default-worker
role: worker
node_count: 1
status: COMPLETE
"#;
        let parsed: Result<NodeGroup, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }
}
