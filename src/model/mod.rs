/// Managed cluster domain model
pub mod cluster;
pub mod status;

pub use cluster::{
    CertificateAuthorities, Cluster, ClusterTemplate, KeyPair, NetworkDriver, NodeGroup,
    NodeGroupRole,
};
pub use status::{Action, LifecycleStatus, Phase};
