/// Durable cluster records
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Cluster, NodeGroup};

/// Persistence for cluster and node group records
///
/// A save must be visible to the next read by the same process.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn save_cluster(&self, cluster: &Cluster) -> Result<()>;

    /// Replace the node group with the same name inside the cluster record
    async fn save_nodegroup(&self, cluster_id: Uuid, nodegroup: &NodeGroup) -> Result<()>;
}

/// One YAML file per cluster under a state directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, cluster_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.yaml", cluster_id))
    }

    /// Load a cluster record
    pub async fn load(&self, cluster_id: Uuid) -> Result<Cluster> {
        let path = self.path(cluster_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("Cluster", cluster_id.to_string()))
            }
            Err(e) => return Err(Error::persistence(path.display().to_string(), e.to_string())),
        };

        serde_yaml::from_str(&content)
            .map_err(|e| Error::persistence(path.display().to_string(), e.to_string()))
    }

    /// All records in the state directory, skipping files that are not cluster records
    pub async fn list(&self) -> Result<Vec<Cluster>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::persistence(self.dir.display().to_string(), e.to_string()))
            }
        };

        let mut clusters = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::persistence(self.dir.display().to_string(), e.to_string()))?
        {
            let id = entry
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok());
            if let Some(id) = id {
                clusters.push(self.load(id).await?);
            }
        }

        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    /// Remove a record; a missing record is not an error
    pub async fn remove(&self, cluster_id: Uuid) -> Result<()> {
        match tokio::fs::remove_file(self.path(cluster_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(cluster_id.to_string(), e.to_string())),
        }
    }

    async fn write(&self, cluster: &Cluster) -> Result<()> {
        let record = cluster.uuid.to_string();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::persistence(&record, e.to_string()))?;

        let content = serde_yaml::to_string(cluster)
            .map_err(|e| Error::persistence(&record, e.to_string()))?;

        // Write then rename so a crash never leaves a truncated record
        let path = self.path(cluster.uuid);
        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::persistence(&record, e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::persistence(&record, e.to_string()))?;

        debug!(cluster = %cluster.uuid, status = %cluster.status, "Saved cluster record");
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for FileStore {
    async fn save_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut record = cluster.clone();
        record.updated_at = Some(Utc::now());
        self.write(&record).await
    }

    async fn save_nodegroup(&self, cluster_id: Uuid, nodegroup: &NodeGroup) -> Result<()> {
        let mut record = self.load(cluster_id).await?;

        match record.nodegroups.iter_mut().find(|ng| ng.name == nodegroup.name) {
            Some(existing) => *existing = nodegroup.clone(),
            None => record.nodegroups.push(nodegroup.clone()),
        }

        record.updated_at = Some(Utc::now());
        self.write(&record).await
    }
}
