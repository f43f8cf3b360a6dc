/// Manifest bodies for the resources the driver applies
use base64::{engine::general_purpose::STANDARD, Engine as _};
use handlebars::Handlebars;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::resources::{cloud_config_secret_name, nodegroup_object_name, ObjectRef, ResourceKind};
use crate::config::IdentityConfig;
use crate::error::{Error, Result};
use crate::keystone::Credential;
use crate::model::{Cluster, KeyPair, NodeGroup, NodeGroupRole};

const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
const CLUSTER_UUID_LABEL: &str = "magnum.openstack.org/cluster-uuid";
const NODEGROUP_LABEL: &str = "magnum.openstack.org/nodegroup";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "capi-driver";

const CLOUD_CONF_PATH: &str = "/etc/kubernetes/cloud.conf";
const CCM_IMAGE: &str = "docker.io/k8scloudprovider/openstack-cloud-controller-manager";
const POD_CIDR: &str = "10.100.0.0/16";
const SERVICE_CIDR: &str = "10.254.0.0/16";

const CLOUD_CONF_TEMPLATE: &str = "[Global]
auth-url={{auth_url}}
region={{region}}
application-credential-id={{credential_id}}
application-credential-secret={{credential_secret}}

[LoadBalancer]
use-octavia=true
";

const CLOUDS_YAML_TEMPLATE: &str = "clouds:
  default:
    auth:
      auth_url: {{auth_url}}
      application_credential_id: {{credential_id}}
      application_credential_secret: {{credential_secret}}
    region_name: {{region}}
    interface: {{interface}}
    identity_api_version: 3
    auth_type: v3applicationcredential
";

/// A fully rendered object ready to be applied
#[derive(Debug, Clone)]
pub struct Manifest {
    pub target: ObjectRef,
    pub labels: BTreeMap<String, String>,
    /// Top-level fields besides apiVersion/kind/metadata (spec, data, ...)
    pub content: Map<String, Value>,
}

impl Manifest {
    fn new(target: ObjectRef) -> Self {
        Self {
            target,
            labels: BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string())]),
            content: Map::new(),
        }
    }

    fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    fn with(mut self, field: &str, value: Value) -> Self {
        self.content.insert(field.to_string(), value);
        self
    }

    /// Full object as sent to the API server
    pub fn to_value(&self) -> Value {
        let mut metadata = json!({
            "name": self.target.name,
            "labels": self.labels,
        });
        if let Some(ns) = &self.target.namespace {
            metadata["namespace"] = json!(ns);
        }

        let mut obj = Map::new();
        obj.insert("apiVersion".to_string(), json!(self.target.api_version));
        obj.insert("kind".to_string(), json!(self.target.kind));
        obj.insert("metadata".to_string(), metadata);
        for (key, value) in &self.content {
            obj.insert(key.clone(), value.clone());
        }
        Value::Object(obj)
    }
}

/// Renders manifests for every resource kind
#[derive(Clone)]
pub struct ManifestBuilder {
    namespace: String,
    identity: IdentityConfig,
    templates: Handlebars<'static>,
}

impl ManifestBuilder {
    pub fn new(namespace: impl Into<String>, identity: IdentityConfig) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string("cloud.conf", CLOUD_CONF_TEMPLATE)
            .map_err(|e| Error::serialization(e.to_string()))?;
        templates
            .register_template_string("clouds.yaml", CLOUDS_YAML_TEMPLATE)
            .map_err(|e| Error::serialization(e.to_string()))?;

        Ok(Self {
            namespace: namespace.into(),
            identity,
            templates,
        })
    }

    /// Reference to the object backing `kind` for this cluster
    pub fn target(
        &self,
        kind: ResourceKind,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
    ) -> Result<ObjectRef> {
        kind.object_ref(&self.namespace, cluster, nodegroup)
    }

    /// Render the manifest for `kind`
    ///
    /// The credential is only consulted by the cloud config secret.
    pub fn build(
        &self,
        kind: ResourceKind,
        cluster: &Cluster,
        nodegroup: Option<&NodeGroup>,
        credential: Option<&Credential>,
    ) -> Result<Manifest> {
        let target = self.target(kind, cluster, nodegroup)?;
        let manifest = Manifest::new(target);

        let manifest = match kind {
            ResourceKind::Namespace => manifest,
            ResourceKind::CloudControllerManagerConfig => self.ccm_config(manifest, cluster)?,
            ResourceKind::CloudControllerManagerResourceSet | ResourceKind::CniResourceSet => {
                let config = match kind {
                    ResourceKind::CniResourceSet => ResourceKind::CniConfig,
                    _ => ResourceKind::CloudControllerManagerConfig,
                };
                let config = self.target(config, cluster, None)?;
                resource_set(manifest, cluster, &config)
            }
            ResourceKind::CniConfig => cni_config(manifest, cluster)?,
            ResourceKind::CloudConfigSecret => {
                let credential = credential.ok_or_else(|| {
                    Error::malformed(
                        "CloudConfigSecret",
                        "an application credential is required to render the cloud config",
                    )
                })?;
                self.cloud_config_secret(manifest, cluster, credential)?
            }
            ResourceKind::ApiCertificateAuthority => {
                ca_secret(manifest, cluster, "api", &cluster.certificate_authorities.api)?
            }
            ResourceKind::EtcdCertificateAuthority => {
                ca_secret(manifest, cluster, "etcd", &cluster.certificate_authorities.etcd)?
            }
            ResourceKind::FrontProxyCertificateAuthority => ca_secret(
                manifest,
                cluster,
                "front-proxy",
                &cluster.certificate_authorities.front_proxy,
            )?,
            ResourceKind::ServiceAccountCertificateAuthority => ca_secret(
                manifest,
                cluster,
                "service-account",
                &cluster.certificate_authorities.service_account,
            )?,
            ResourceKind::OpenStackMachineTemplate => {
                machine_template(manifest, cluster, require(kind, nodegroup)?)
            }
            ResourceKind::KubeadmControlPlane => {
                self.control_plane(manifest, cluster, require(kind, nodegroup)?)
            }
            ResourceKind::KubeadmConfigTemplate => worker_config_template(manifest, cluster),
            ResourceKind::MachineDeployment => {
                self.machine_deployment(manifest, cluster, require(kind, nodegroup)?)
            }
            ResourceKind::OpenStackCluster => openstack_cluster(manifest, cluster),
            ResourceKind::Cluster => self.cluster(manifest, cluster)?,
        };

        Ok(manifest)
    }

    fn render(&self, template: &str, credential: &Credential) -> Result<String> {
        let data = json!({
            "auth_url": self.identity.auth_url,
            "region": self.identity.region_name,
            "interface": self.identity.interface,
            "credential_id": credential.id,
            "credential_secret": credential.secret,
        });
        self.templates
            .render(template, &data)
            .map_err(|e| Error::serialization(format!("failed to render {}: {}", template, e)))
    }

    fn ccm_config(&self, manifest: Manifest, cluster: &Cluster) -> Result<Manifest> {
        let daemonset = json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {
                "name": "openstack-cloud-controller-manager",
                "namespace": "kube-system",
            },
            "spec": {
                "selector": {"matchLabels": {"k8s-app": "openstack-cloud-controller-manager"}},
                "template": {
                    "metadata": {"labels": {"k8s-app": "openstack-cloud-controller-manager"}},
                    "spec": {
                        "nodeSelector": {"node-role.kubernetes.io/control-plane": ""},
                        "tolerations": [
                            {"key": "node.cloudprovider.kubernetes.io/uninitialized", "value": "true", "effect": "NoSchedule"},
                            {"key": "node-role.kubernetes.io/control-plane", "effect": "NoSchedule"},
                        ],
                        "hostNetwork": true,
                        "containers": [{
                            "name": "openstack-cloud-controller-manager",
                            "image": format!("{}:{}", CCM_IMAGE, cluster.kube_tag()),
                            "args": [
                                "/bin/openstack-cloud-controller-manager",
                                format!("--cloud-config={}", CLOUD_CONF_PATH),
                                format!("--cluster-name={}", cluster.uuid),
                                "--use-service-account-credentials=true",
                            ],
                            "volumeMounts": [{"name": "cloud-config", "mountPath": CLOUD_CONF_PATH, "readOnly": true}],
                        }],
                        "volumes": [{"name": "cloud-config", "hostPath": {"path": CLOUD_CONF_PATH, "type": "File"}}],
                    },
                },
            },
        });

        let body = serde_yaml::to_string(&daemonset)
            .map_err(|e| Error::serialization(e.to_string()))?;
        Ok(manifest.with("data", json!({ "cloud-controller-manager.yaml": body })))
    }

    fn cloud_config_secret(
        &self,
        manifest: Manifest,
        cluster: &Cluster,
        credential: &Credential,
    ) -> Result<Manifest> {
        Ok(manifest
            .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
            .with("type", json!("Opaque"))
            .with(
                "stringData",
                json!({
                    "clouds.yaml": self.render("clouds.yaml", credential)?,
                    "cloud.conf": self.render("cloud.conf", credential)?,
                    "cacert": "",
                }),
            ))
    }

    /// Control plane whose nodes read `cloud.conf` from the cloud config secret
    ///
    /// The body never carries the credential itself.
    fn control_plane(&self, manifest: Manifest, cluster: &Cluster, nodegroup: &NodeGroup) -> Manifest {
        let cloud_conf = json!({
            "path": CLOUD_CONF_PATH,
            "owner": "root:root",
            "permissions": "0600",
            "contentFrom": {"secret": {"name": cloud_config_secret_name(cluster), "key": "cloud.conf"}},
        });

        let node_registration = json!({
            "name": "{{ local_hostname }}",
            "kubeletExtraArgs": {"cloud-provider": "external"},
        });

        manifest
            .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
            .with_label(NODEGROUP_LABEL, &nodegroup.name)
            .with(
                "spec",
                json!({
                    "replicas": nodegroup.node_count,
                    "version": cluster.kube_tag(),
                    "machineTemplate": {
                        "infrastructureRef": {
                            "apiVersion": ResourceKind::OpenStackMachineTemplate.api_version(),
                            "kind": ResourceKind::OpenStackMachineTemplate.kind(),
                            "name": nodegroup_object_name(cluster, nodegroup),
                        },
                    },
                    "kubeadmConfigSpec": {
                        "initConfiguration": {"nodeRegistration": node_registration},
                        "joinConfiguration": {"nodeRegistration": node_registration},
                        "clusterConfiguration": {
                            "apiServer": {"extraArgs": {"cloud-provider": "external"}},
                            "controllerManager": {"extraArgs": {"cloud-provider": "external"}},
                        },
                        "files": [cloud_conf],
                    },
                }),
            )
    }

    fn machine_deployment(
        &self,
        manifest: Manifest,
        cluster: &Cluster,
        nodegroup: &NodeGroup,
    ) -> Manifest {
        let uuid = cluster.uuid.to_string();
        let selector = json!({
            CLUSTER_NAME_LABEL: uuid,
            NODEGROUP_LABEL: nodegroup.name,
        });

        manifest
            .with_label(CLUSTER_NAME_LABEL, &uuid)
            .with_label(NODEGROUP_LABEL, &nodegroup.name)
            .with(
                "spec",
                json!({
                    "clusterName": uuid,
                    "replicas": nodegroup.node_count,
                    "selector": {"matchLabels": selector},
                    "template": {
                        "metadata": {"labels": selector},
                        "spec": {
                            "clusterName": uuid,
                            "version": cluster.kube_tag(),
                            "bootstrap": {
                                "configRef": {
                                    "apiVersion": ResourceKind::KubeadmConfigTemplate.api_version(),
                                    "kind": ResourceKind::KubeadmConfigTemplate.kind(),
                                    "name": uuid,
                                },
                            },
                            "infrastructureRef": {
                                "apiVersion": ResourceKind::OpenStackMachineTemplate.api_version(),
                                "kind": ResourceKind::OpenStackMachineTemplate.kind(),
                                "name": nodegroup_object_name(cluster, nodegroup),
                            },
                        },
                    },
                }),
            )
    }

    fn cluster(&self, manifest: Manifest, cluster: &Cluster) -> Result<Manifest> {
        let master = cluster.masters().next().ok_or_else(|| {
            Error::malformed(
                format!("cluster {}", cluster.uuid),
                "no master node group declared",
            )
        })?;

        Ok(manifest
            .with_label(CLUSTER_UUID_LABEL, cluster.uuid.to_string())
            .with(
                "spec",
                json!({
                    "clusterNetwork": {
                        "serviceDomain": "cluster.local",
                        "pods": {"cidrBlocks": [POD_CIDR]},
                        "services": {"cidrBlocks": [SERVICE_CIDR]},
                    },
                    "controlPlaneRef": {
                        "apiVersion": ResourceKind::KubeadmControlPlane.api_version(),
                        "kind": ResourceKind::KubeadmControlPlane.kind(),
                        "name": nodegroup_object_name(cluster, master),
                    },
                    "infrastructureRef": {
                        "apiVersion": ResourceKind::OpenStackCluster.api_version(),
                        "kind": ResourceKind::OpenStackCluster.kind(),
                        "name": cluster.uuid.to_string(),
                    },
                }),
            ))
    }
}

fn require(kind: ResourceKind, nodegroup: Option<&NodeGroup>) -> Result<&NodeGroup> {
    nodegroup.ok_or_else(|| Error::malformed(kind.kind(), "a node group is required"))
}

fn identity_ref(cluster: &Cluster) -> Value {
    json!({"name": cloud_config_secret_name(cluster), "kind": "Secret"})
}

/// ClusterResourceSet pushing a ConfigMap into the workload cluster
fn resource_set(manifest: Manifest, cluster: &Cluster, config: &ObjectRef) -> Manifest {
    manifest.with(
        "spec",
        json!({
            "clusterSelector": {"matchLabels": {CLUSTER_UUID_LABEL: cluster.uuid.to_string()}},
            "resources": [{"name": config.name, "kind": config.kind}],
            "strategy": "ApplyOnce",
        }),
    )
}

fn cni_config(manifest: Manifest, cluster: &Cluster) -> Result<Manifest> {
    let calico_config = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "calico-config", "namespace": "kube-system"},
        "data": {
            "calico_backend": "bird",
            "veth_mtu": "0",
            "typha_service_name": "none",
            "cluster_cidr": POD_CIDR,
        },
    });

    let body = serde_yaml::to_string(&calico_config)
        .map_err(|e| Error::serialization(e.to_string()))?;
    Ok(manifest.with(
        "data",
        json!({ format!("{}.yaml", cluster.cluster_template.network_driver): body }),
    ))
}

fn ca_secret(
    manifest: Manifest,
    cluster: &Cluster,
    purpose: &str,
    pair: &Option<KeyPair>,
) -> Result<Manifest> {
    let pair = pair.as_ref().ok_or_else(|| {
        Error::malformed(
            format!("cluster {}", cluster.uuid),
            format!("no {} certificate authority material", purpose),
        )
    })?;

    Ok(manifest
        .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
        .with("type", json!("cluster.x-k8s.io/secret"))
        .with(
            "data",
            json!({
                "tls.crt": STANDARD.encode(&pair.certificate),
                "tls.key": STANDARD.encode(&pair.private_key),
            }),
        ))
}

fn machine_template(manifest: Manifest, cluster: &Cluster, nodegroup: &NodeGroup) -> Manifest {
    let template = &cluster.cluster_template;
    let flavor = nodegroup.flavor_id.clone().unwrap_or_else(|| match nodegroup.role {
        NodeGroupRole::Master => template.master_flavor_id.clone(),
        NodeGroupRole::Worker => template.flavor_id.clone(),
    });
    let image = nodegroup
        .image_id
        .clone()
        .unwrap_or_else(|| template.image_id.clone());

    let mut machine_spec = json!({
        "cloudName": "default",
        "identityRef": identity_ref(cluster),
        "flavor": flavor,
        "image": image,
    });
    if let Some(keypair) = &cluster.keypair {
        machine_spec["sshKeyName"] = json!(keypair);
    }

    manifest
        .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
        .with_label(NODEGROUP_LABEL, &nodegroup.name)
        .with("spec", json!({ "template": { "spec": machine_spec } }))
}

fn worker_config_template(manifest: Manifest, cluster: &Cluster) -> Manifest {
    manifest
        .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
        .with(
            "spec",
            json!({
                "template": {
                    "spec": {
                        "joinConfiguration": {
                            "nodeRegistration": {
                                "name": "{{ local_hostname }}",
                                "kubeletExtraArgs": {"cloud-provider": "external"},
                            },
                        },
                    },
                },
            }),
        )
}

fn openstack_cluster(manifest: Manifest, cluster: &Cluster) -> Manifest {
    let template = &cluster.cluster_template;
    manifest
        .with_label(CLUSTER_NAME_LABEL, cluster.uuid.to_string())
        .with(
            "spec",
            json!({
                "cloudName": "default",
                "identityRef": identity_ref(cluster),
                "managedSecurityGroups": true,
                "nodeCidr": template.fixed_subnet_cidr,
                "dnsNameservers": [template.dns_nameserver],
                "externalNetworkId": template.external_network_id,
                "apiServerLoadBalancer": {"enabled": true},
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::model::CertificateAuthorities;

    fn builder() -> ManifestBuilder {
        ManifestBuilder::new("magnum-system", DriverConfig::example().identity).unwrap()
    }

    fn credential() -> Credential {
        Credential {
            id: "cred-1".to_string(),
            name: "cluster".to_string(),
            secret: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_cloud_config_secret_renders_credential() {
        let cluster = Cluster::example();
        let manifest = builder()
            .build(ResourceKind::CloudConfigSecret, &cluster, None, Some(&credential()))
            .unwrap();

        let value = manifest.to_value();
        let cloud_conf = value["stringData"]["cloud.conf"].as_str().unwrap();
        assert!(cloud_conf.contains("application-credential-id=cred-1"));
        assert!(cloud_conf.contains("region=RegionOne"));
        let clouds = value["stringData"]["clouds.yaml"].as_str().unwrap();
        assert!(clouds.contains("application_credential_secret: s3cret"));
        assert_eq!(value["metadata"]["namespace"], "magnum-system");
    }

    #[test]
    fn test_cloud_config_secret_requires_credential() {
        let cluster = Cluster::example();
        let err = builder()
            .build(ResourceKind::CloudConfigSecret, &cluster, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedState { .. }));
    }

    #[test]
    fn test_control_plane_references_cloud_config_secret() {
        let cluster = Cluster::example();
        let master = cluster.masters().next().unwrap().clone();

        let with_credential = builder()
            .build(ResourceKind::KubeadmControlPlane, &cluster, Some(&master), Some(&credential()))
            .unwrap()
            .to_value();
        let without_credential = builder()
            .build(ResourceKind::KubeadmControlPlane, &cluster, Some(&master), None)
            .unwrap()
            .to_value();
        assert_eq!(with_credential, without_credential);

        let file = &with_credential["spec"]["kubeadmConfigSpec"]["files"][0];
        assert!(file.get("content").is_none());
        assert_eq!(
            file["contentFrom"]["secret"]["name"],
            format!("{}-cloud-config", cluster.uuid)
        );
        assert!(!with_credential.to_string().contains("s3cret"));
        assert_eq!(with_credential["spec"]["version"], "v1.23.5");
        assert_eq!(with_credential["spec"]["replicas"], 1);
    }

    #[test]
    fn test_ca_secret_requires_material() {
        let mut cluster = Cluster::example();
        assert!(builder()
            .build(ResourceKind::ApiCertificateAuthority, &cluster, None, None)
            .is_err());

        cluster.certificate_authorities = CertificateAuthorities {
            api: Some(KeyPair {
                certificate: "CERT".to_string(),
                private_key: "KEY".to_string(),
            }),
            ..Default::default()
        };
        let value = builder()
            .build(ResourceKind::ApiCertificateAuthority, &cluster, None, None)
            .unwrap()
            .to_value();
        assert_eq!(value["data"]["tls.crt"], STANDARD.encode("CERT"));
        assert_eq!(value["type"], "cluster.x-k8s.io/secret");
    }

    #[test]
    fn test_cluster_references_master_control_plane() {
        let cluster = Cluster::example();
        let value = builder()
            .build(ResourceKind::Cluster, &cluster, None, None)
            .unwrap()
            .to_value();
        assert_eq!(
            value["spec"]["controlPlaneRef"]["name"],
            format!("{}-default-master", cluster.uuid)
        );
        assert_eq!(
            value["metadata"]["labels"][CLUSTER_UUID_LABEL],
            cluster.uuid.to_string()
        );

        let mut headless = cluster.clone();
        headless.nodegroups.retain(|ng| !ng.is_master());
        assert!(builder()
            .build(ResourceKind::Cluster, &headless, None, None)
            .is_err());
    }

    #[test]
    fn test_machine_template_flavor_by_role() {
        let cluster = Cluster::example();
        let worker = cluster.workers().next().unwrap().clone();
        let value = builder()
            .build(ResourceKind::OpenStackMachineTemplate, &cluster, Some(&worker), None)
            .unwrap()
            .to_value();
        assert_eq!(value["spec"]["template"]["spec"]["flavor"], "m1.large");
        assert_eq!(value["spec"]["template"]["spec"]["sshKeyName"], "default");
    }
}
