//! On-disk manifest output

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use super::{sanitize_cluster_name, write_atomic};
use crate::{Error, Result};

/// File name of the rendered manifest stream inside a cluster's directory
pub const MANIFEST_FILE_NAME: &str = "cluster-template.yaml";

/// Trait for persisting a rendered manifest stream
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestWriter: Send + Sync {
    /// Write the stream for a cluster, returning where it was written
    async fn write(&self, cluster_name: &str, manifest: &str) -> Result<PathBuf>;
}

/// Writes `<dir>/<sanitized cluster name>/cluster-template.yaml`
#[derive(Clone, Debug)]
pub struct FileManifestWriter {
    dir: PathBuf,
}

impl FileManifestWriter {
    /// Create a writer rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the manifest file for a cluster
    pub fn path_for(&self, cluster_name: &str) -> PathBuf {
        self.dir
            .join(sanitize_cluster_name(cluster_name))
            .join(MANIFEST_FILE_NAME)
    }
}

#[async_trait]
impl ManifestWriter for FileManifestWriter {
    async fn write(&self, cluster_name: &str, manifest: &str) -> Result<PathBuf> {
        let path = self.path_for(cluster_name);
        write_atomic(&path, manifest).await.map_err(|e| {
            Error::persistence(
                cluster_name,
                format!("failed to write manifests to {}: {}", path.display(), e),
            )
        })?;
        info!(cluster = %cluster_name, path = %path.display(), "manifests generated");
        Ok(path)
    }
}
