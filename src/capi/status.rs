/// Typed views over the status of reconciled Cluster API objects
///
/// Objects are decoded once at fetch time. Optional fields stay optional;
/// a field the caller requires but the reconciler has not reported yields
/// `MalformedState` rather than a silent default.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use super::facade::ObservedObject;
use crate::error::{Error, Result};

pub const CONTROL_PLANE_READY: &str = "ControlPlaneReady";

/// A single `status.conditions` entry
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSpecDocument {
    #[serde(default)]
    control_plane_endpoint: Option<ApiEndpoint>,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionsDocument {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct ClusterDocument {
    #[serde(default)]
    spec: ClusterSpecDocument,
    #[serde(default)]
    status: ConditionsDocument,
}

/// Observed state of the top-level `Cluster` object
#[derive(Debug, Clone)]
pub struct CapiClusterObservation {
    pub object: String,
    pub conditions: Vec<Condition>,
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

impl CapiClusterObservation {
    pub fn decode(observed: &ObservedObject) -> Result<Self> {
        let doc: ClusterDocument = observed.decode()?;
        Ok(Self {
            object: observed.target.to_string(),
            conditions: doc.status.conditions,
            control_plane_endpoint: doc.spec.control_plane_endpoint,
        })
    }

    /// Condition type to status, later entries win
    pub fn condition_map(&self) -> BTreeMap<&str, &str> {
        self.conditions
            .iter()
            .map(|c| (c.type_.as_str(), c.status.as_str()))
            .collect()
    }

    pub fn control_plane_ready(&self) -> bool {
        self.condition_map().get(CONTROL_PLANE_READY) == Some(&"True")
    }

    /// `https://host:port` from `spec.controlPlaneEndpoint`
    pub fn api_address(&self) -> Result<String> {
        match &self.control_plane_endpoint {
            Some(endpoint) if !endpoint.host.is_empty() && endpoint.port != 0 => {
                Ok(format!("https://{}:{}", endpoint.host, endpoint.port))
            }
            _ => Err(Error::malformed(
                &self.object,
                "spec.controlPlaneEndpoint is not set",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlPlaneStatusDocument {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    failure_message: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ControlPlaneDocument {
    #[serde(default)]
    status: ControlPlaneStatusDocument,
}

/// Observed state of a `KubeadmControlPlane`
#[derive(Debug, Clone)]
pub struct ControlPlaneObservation {
    pub object: String,
    pub ready: bool,
    pub failure_message: Option<String>,
    pub version: Option<String>,
}

impl ControlPlaneObservation {
    pub fn decode(observed: &ObservedObject) -> Result<Self> {
        let doc: ControlPlaneDocument = observed.decode()?;
        Ok(Self {
            object: observed.target.to_string(),
            ready: doc.status.ready,
            failure_message: doc.status.failure_message,
            version: doc.status.version,
        })
    }

    /// Reported Kubernetes version, required once the control plane is ready
    pub fn version(&self) -> Result<&str> {
        self.version
            .as_deref()
            .ok_or_else(|| Error::malformed(&self.object, "status.version is not set"))
    }
}

/// `MachineDeployment` phases reported by Cluster API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineDeploymentPhase {
    ScalingUp,
    ScalingDown,
    Running,
    Failed,
    Unknown,
    /// A value outside the documented enumeration
    Other(String),
}

impl From<&str> for MachineDeploymentPhase {
    fn from(value: &str) -> Self {
        match value {
            "ScalingUp" => Self::ScalingUp,
            "ScalingDown" => Self::ScalingDown,
            "Running" => Self::Running,
            "Failed" => Self::Failed,
            "Unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MachineDeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(value) => write!(f, "{}", value),
            known => write!(f, "{:?}", known),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PhaseDocument {
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MachineDeploymentDocument {
    #[serde(default)]
    status: PhaseDocument,
}

/// Observed state of a `MachineDeployment`
#[derive(Debug, Clone)]
pub struct MachineDeploymentObservation {
    pub object: String,
    pub phase: MachineDeploymentPhase,
}

impl MachineDeploymentObservation {
    pub fn decode(observed: &ObservedObject) -> Result<Self> {
        let doc: MachineDeploymentDocument = observed.decode()?;
        let phase = doc
            .status
            .phase
            .ok_or_else(|| Error::malformed(observed.target.to_string(), "status.phase is not set"))?;

        Ok(Self {
            object: observed.target.to_string(),
            phase: MachineDeploymentPhase::from(phase.as_str()),
        })
    }
}
