/// capi-driver - Cluster API lifecycle driver for OpenStack
///
/// Provisions and tears down Kubernetes clusters by applying Cluster API
/// resources to a management cluster and tracking their reconciled state.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use capi_driver::capi::{KubeResourceFacade, ManifestBuilder};
use capi_driver::config::DriverConfig;
use capi_driver::keystone::{CredentialManager, KeystoneClient};
use capi_driver::model::{Cluster, LifecycleStatus, NodeGroup, NodeGroupRole};
use capi_driver::store::{ClusterStore, FileStore};
use capi_driver::utils::PollingConfig;
use capi_driver::Driver;

#[derive(Parser)]
#[command(name = "capi-driver")]
#[command(about = "Manage Kubernetes clusters on OpenStack through Cluster API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Driver configuration file path
    #[arg(short, long, default_value = "driver.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example driver configuration and cluster record
    Init {
        /// Where to write the example cluster record
        #[arg(long, default_value = "cluster.yaml")]
        cluster: PathBuf,
    },

    /// Create a cluster from a cluster record file
    Create {
        /// Cluster record file
        #[arg(long, default_value = "cluster.yaml")]
        cluster: PathBuf,
    },

    /// Start deleting a cluster
    Delete {
        /// Cluster UUID
        uuid: Uuid,
    },

    /// Run one status reconciliation pass and show the cluster
    Status {
        /// Cluster UUID
        uuid: Uuid,
    },

    /// Reconcile until the cluster reaches a terminal status
    Watch {
        /// Cluster UUID
        uuid: Uuid,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 1800)]
        timeout: u64,

        /// Seconds between reconciliation passes
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },

    /// List known clusters
    List,

    /// Manage node groups of an existing cluster
    Nodegroup {
        #[command(subcommand)]
        command: NodegroupCommands,
    },

    /// Show the platforms this driver provisions
    Provides,
}

#[derive(Subcommand)]
enum NodegroupCommands {
    /// Add a node group to a cluster, moving a settled cluster to UPDATE_IN_PROGRESS
    Create {
        uuid: Uuid,
        name: String,
        #[arg(long, value_enum, default_value_t = Role::Worker)]
        role: Role,
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Flavor overriding the cluster template
        #[arg(long)]
        flavor: Option<String>,
    },

    /// Remove a node group from a cluster
    Delete { uuid: Uuid, name: String },

    /// Reconcile and show a node group's status
    Status { uuid: Uuid, name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Master,
    Worker,
}

impl From<Role> for NodeGroupRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Master => NodeGroupRole::Master,
            Role::Worker => NodeGroupRole::Worker,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("capi_driver={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Init { ref cluster } => init_config(&cli, cluster).await,
        Commands::Create { ref cluster } => create_cluster(&cli, cluster).await,
        Commands::Delete { uuid } => delete_cluster(&cli, uuid).await,
        Commands::Status { uuid } => show_status(&cli, uuid).await,
        Commands::Watch {
            uuid,
            timeout,
            interval,
        } => watch_cluster(&cli, uuid, timeout, interval).await,
        Commands::List => list_clusters(&cli).await,
        Commands::Nodegroup { ref command } => nodegroup(&cli, command).await,
        Commands::Provides => show_provides(),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    DriverConfig::from_file(&cli.config).context("Failed to load configuration")
}

/// Build the driver and its clients once per invocation
async fn connect(config: &DriverConfig) -> Result<(Driver, FileStore)> {
    let resources = KubeResourceFacade::connect(config.kubeconfig.as_deref())
        .await
        .context("Failed to connect to the management cluster")?;
    let keystone = KeystoneClient::authenticate(&config.identity)
        .await
        .context("Failed to authenticate against the identity service")?;
    let manifests = ManifestBuilder::new(config.namespace.clone(), config.identity.clone())?;
    let store = FileStore::new(&config.state_dir);

    let driver = Driver::new(
        Arc::new(resources),
        CredentialManager::new(Arc::new(keystone)),
        Arc::new(store.clone()),
        manifests,
    );

    Ok((driver, store))
}

/// Initialize example configuration files
async fn init_config(cli: &Cli, cluster_path: &Path) -> Result<()> {
    for path in [cli.config.as_path(), cluster_path] {
        if path.exists() {
            anyhow::bail!("File already exists: {}", path.display());
        }
    }

    let config = serde_yaml::to_string(&DriverConfig::example())?;
    tokio::fs::write(&cli.config, config)
        .await
        .context("Failed to write configuration file")?;

    let cluster = serde_yaml::to_string(&Cluster::example())?;
    tokio::fs::write(cluster_path, cluster)
        .await
        .context("Failed to write cluster record")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("Example cluster record created: {}", cluster_path.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit both files to match your cloud, including certificate_authorities");
    info!("  2. Set your OpenStack credentials:");
    info!("     export OS_USERNAME=... OS_PASSWORD=... OS_PROJECT_NAME=...");
    info!("  3. Create the cluster:");
    info!("     capi-driver create --cluster {}", cluster_path.display());

    Ok(())
}

/// Create a cluster from a record file
async fn create_cluster(cli: &Cli, cluster_path: &Path) -> Result<()> {
    let config = load_config(cli)?;

    let content = tokio::fs::read_to_string(cluster_path)
        .await
        .with_context(|| format!("Failed to read {}", cluster_path.display()))?;
    let mut cluster: Cluster = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", cluster_path.display()))?;

    if cluster.masters().next().is_none() {
        anyhow::bail!("Cluster {} declares no master node group", cluster.name);
    }

    info!("Starting cluster creation...");
    info!("Cluster: {} ({})", cluster.name, cluster.uuid);

    let (driver, store) = connect(&config).await?;

    cluster.status = LifecycleStatus::CREATE_IN_PROGRESS;
    for nodegroup in &mut cluster.nodegroups {
        nodegroup.status = LifecycleStatus::CREATE_IN_PROGRESS;
    }
    store.save_cluster(&cluster).await?;

    driver.create_cluster(&cluster).await?;

    info!("✓ Cluster resources applied");
    info!("");
    info!("Track progress with:");
    info!("  capi-driver watch {}", cluster.uuid);

    Ok(())
}

/// Start deleting a cluster
async fn delete_cluster(cli: &Cli, uuid: Uuid) -> Result<()> {
    let config = load_config(cli)?;
    let (driver, store) = connect(&config).await?;

    let mut cluster = store.load(uuid).await?;
    info!("Deleting cluster: {} ({})", cluster.name, cluster.uuid);

    driver.delete_cluster(&cluster).await?;

    cluster.status = LifecycleStatus::DELETE_IN_PROGRESS;
    store.save_cluster(&cluster).await?;

    info!("✓ Deletion started");
    info!("  capi-driver watch {}", cluster.uuid);

    Ok(())
}

/// Run one reconciliation pass and print the cluster
async fn show_status(cli: &Cli, uuid: Uuid) -> Result<()> {
    let config = load_config(cli)?;
    let (driver, store) = connect(&config).await?;

    let mut cluster = store.load(uuid).await?;
    driver.update_cluster_status(&mut cluster).await?;

    print_cluster(&cluster);
    forget_if_deleted(&store, &cluster).await
}

/// Reconcile until terminal or timeout
async fn watch_cluster(cli: &Cli, uuid: Uuid, timeout: u64, interval: u64) -> Result<()> {
    let config = load_config(cli)?;
    let (driver, store) = connect(&config).await?;

    let polling = PollingConfig::new(
        Duration::from_secs(timeout),
        Duration::from_secs(interval),
        format!("Waiting for cluster {} to settle", uuid),
    );

    let cluster = polling
        .poll(|| {
            let driver = driver.clone();
            let store = store.clone();
            async move {
                let mut cluster = store.load(uuid).await?;
                driver.update_cluster_status(&mut cluster).await?;
                info!("  {} ({})", cluster.status, cluster.name);
                Ok::<_, anyhow::Error>(cluster.status.is_terminal().then_some(cluster))
            }
        })
        .await?;

    print_cluster(&cluster);
    forget_if_deleted(&store, &cluster).await
}

async fn forget_if_deleted(store: &FileStore, cluster: &Cluster) -> Result<()> {
    if cluster.status == LifecycleStatus::DELETE_COMPLETE {
        store.remove(cluster.uuid).await?;
        info!("Removed record for deleted cluster {}", cluster.uuid);
    }
    Ok(())
}

async fn list_clusters(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let store = FileStore::new(&config.state_dir);

    let clusters = store.list().await?;
    if clusters.is_empty() {
        info!("No clusters found in {}", store.dir().display());
        return Ok(());
    }

    for cluster in clusters {
        info!("{} {} {}", cluster.uuid, cluster.name, cluster.status);
    }

    Ok(())
}

fn print_cluster(cluster: &Cluster) {
    info!("Cluster: {} ({})", cluster.name, cluster.uuid);
    info!("  Status: {}", cluster.status);
    if let Some(reason) = &cluster.status_reason {
        info!("  Reason: {}", reason);
    }
    info!(
        "  API address: {}",
        cluster.api_address.as_deref().unwrap_or("N/A")
    );
    info!(
        "  Kubernetes version: {}",
        cluster.coe_version.as_deref().unwrap_or("N/A")
    );
    info!("  Node groups:");
    for nodegroup in &cluster.nodegroups {
        print_nodegroup(nodegroup);
    }
}

fn print_nodegroup(nodegroup: &NodeGroup) {
    info!(
        "    - {} ({}, {} nodes): {}{}",
        nodegroup.name,
        nodegroup.role,
        nodegroup.node_count,
        nodegroup.status,
        nodegroup
            .status_reason
            .as_deref()
            .map(|r| format!(" - {}", r))
            .unwrap_or_default()
    );
}

async fn nodegroup(cli: &Cli, command: &NodegroupCommands) -> Result<()> {
    let config = load_config(cli)?;
    let (driver, store) = connect(&config).await?;

    match command {
        NodegroupCommands::Create {
            uuid,
            name,
            role,
            count,
            flavor,
        } => {
            let mut cluster = store.load(*uuid).await?;
            if cluster.nodegroups.iter().any(|ng| &ng.name == name) {
                anyhow::bail!("Node group {} already exists in {}", name, cluster.name);
            }

            let mut nodegroup = NodeGroup::new(name.clone(), (*role).into(), *count);
            nodegroup.flavor_id = flavor.clone();

            driver.add_nodegroup(&mut cluster, nodegroup).await?;

            info!("✓ Node group {} provisioning started", name);
            info!("  Cluster status: {}", cluster.status);
        }
        NodegroupCommands::Delete { uuid, name } => {
            let mut cluster = store.load(*uuid).await?;
            let nodegroup = find_nodegroup(&cluster, name)?;

            driver.delete_nodegroup(&cluster, &nodegroup).await?;

            cluster.nodegroups.retain(|ng| &ng.name != name);
            store.save_cluster(&cluster).await?;

            info!("✓ Node group {} deleted", name);
        }
        NodegroupCommands::Status { uuid, name } => {
            let cluster = store.load(*uuid).await?;
            let nodegroup = find_nodegroup(&cluster, name)?;

            let nodegroup = driver.update_nodegroup_status(&cluster, &nodegroup).await?;
            print_nodegroup(&nodegroup);
        }
    }

    Ok(())
}

fn find_nodegroup(cluster: &Cluster, name: &str) -> Result<NodeGroup> {
    cluster
        .nodegroups
        .iter()
        .find(|ng| ng.name == name)
        .cloned()
        .with_context(|| format!("Node group {} not found in {}", name, cluster.name))
}

fn show_provides() -> Result<()> {
    let provides = serde_json::to_string_pretty(&Driver::provides())?;
    println!("{}", provides);
    Ok(())
}
