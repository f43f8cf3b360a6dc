/// Configuration management for the Cluster API driver
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};

/// Main driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Namespace holding every Cluster API resource the driver manages
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Kubeconfig for the management cluster (falls back to the ambient config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Directory holding one YAML record per cluster
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// OpenStack identity configuration
    pub identity: IdentityConfig,
}

/// OpenStack identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Keystone endpoint (e.g., "https://keystone.example.com:5000/v3")
    pub auth_url: String,

    /// Region used for the cloud provider and block storage
    pub region_name: String,

    /// Endpoint interface for in-cluster components
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Username (can also be set via OS_USERNAME env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password (can also be set via OS_PASSWORD env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Project to scope the token to (can also be set via OS_PROJECT_NAME env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default = "default_domain")]
    pub user_domain_name: String,

    #[serde(default = "default_domain")]
    pub project_domain_name: String,
}

fn default_namespace() -> String {
    "magnum-system".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_interface() -> String {
    "public".to_string()
}

fn default_domain() -> String {
    "Default".to_string()
}

impl DriverConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: DriverConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace cannot be empty".to_string()));
        }

        if self.identity.region_name.is_empty() {
            return Err(Error::Config("identity.region_name cannot be empty".to_string()));
        }

        let url = Url::parse(&self.identity.auth_url).map_err(|e| {
            Error::Config(format!(
                "invalid identity.auth_url {}: {}",
                self.identity.auth_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "identity.auth_url must be http(s): {}",
                self.identity.auth_url
            )));
        }

        Ok(())
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            namespace: default_namespace(),
            kubeconfig: None,
            state_dir: default_state_dir(),
            identity: IdentityConfig {
                auth_url: "https://keystone.example.com:5000/v3".to_string(),
                region_name: "RegionOne".to_string(),
                interface: default_interface(),
                username: None,
                password: None,
                project_name: None,
                user_domain_name: default_domain(),
                project_domain_name: default_domain(),
            },
        }
    }
}

impl IdentityConfig {
    /// Get username from config or environment
    pub fn get_username(&self) -> Result<String> {
        from_config_or_env(&self.username, "OS_USERNAME", "username")
    }

    /// Get password from config or environment
    pub fn get_password(&self) -> Result<String> {
        from_config_or_env(&self.password, "OS_PASSWORD", "password")
    }

    /// Get project name from config or environment
    pub fn get_project_name(&self) -> Result<String> {
        from_config_or_env(&self.project_name, "OS_PROJECT_NAME", "project_name")
    }
}

fn from_config_or_env(value: &Option<String>, var: &str, field: &str) -> Result<String> {
    value
        .clone()
        .or_else(|| std::env::var(var).ok())
        .ok_or_else(|| {
            Error::Config(format!(
                "identity {} not found. Set {} environment variable or specify in config",
                field, var
            ))
        })
}
