//! Durable cluster state
//!
//! The [`StateStore`] holds the last applied [`ClusterSpecification`] per
//! cluster, keyed by the sanitized cluster name. A missing or unreadable
//! record loads as `None`: for the diff that simply means "new cluster".
//!
//! [`ManifestWriter`] persists the rendered manifest stream next to it.

mod manifests;

pub use manifests::{FileManifestWriter, ManifestWriter, MANIFEST_FILE_NAME};

#[cfg(test)]
pub use manifests::MockManifestWriter;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::cluster::ClusterSpecification;
use crate::{Error, Result};

/// Characters that may not appear in a storage key
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace filesystem-reserved characters in a cluster name with `_`
pub fn sanitize_cluster_name(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Trait for loading and saving cluster specifications
///
/// This trait abstracts the storage backend for testability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last applied specification, or `None` if there is none
    async fn load(&self, cluster_name: &str) -> Option<ClusterSpecification>;

    /// Replace the stored specification, returning where it was written
    async fn save(&self, spec: &ClusterSpecification) -> Result<PathBuf>;
}

/// Write `contents` to `path` via a temporary file and rename
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// State store keeping one YAML file per cluster in a directory
#[derive(Clone, Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir` (created lazily on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the state file for a cluster
    pub fn path_for(&self, cluster_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.yaml", sanitize_cluster_name(cluster_name)))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, cluster_name: &str) -> Option<ClusterSpecification> {
        let path = self.path_for(cluster_name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(cluster = %cluster_name, path = %path.display(), "no previous state");
                return None;
            }
            Err(e) => {
                warn!(
                    cluster = %cluster_name,
                    path = %path.display(),
                    error = %e,
                    "failed to read previous state"
                );
                return None;
            }
        };

        if content.trim().is_empty() {
            return None;
        }

        match serde_yaml::from_str(&content) {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!(
                    cluster = %cluster_name,
                    path = %path.display(),
                    error = %e,
                    "ignoring unparseable previous state"
                );
                None
            }
        }
    }

    async fn save(&self, spec: &ClusterSpecification) -> Result<PathBuf> {
        let path = self.path_for(&spec.cluster_name);
        let yaml = serde_yaml::to_string(spec)
            .map_err(|e| Error::serialization(format!("cluster state: {e}")))?;

        write_atomic(&path, &yaml).await.map_err(|e| {
            Error::persistence(
                &spec.cluster_name,
                format!("failed to write {}: {}", path.display(), e),
            )
        })?;

        info!(cluster = %spec.cluster_name, path = %path.display(), "configuration saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{TaintEffect, WorkerGroup};

    fn sample() -> ClusterSpecification {
        ClusterSpecification::new("c1", "ewr")
            .with_worker_group("w1", WorkerGroup::new(2, "p1").with_taint(TaintEffect::NoSchedule))
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_cluster_name("prod/eu:1"), "prod_eu_1");
        assert_eq!(sanitize_cluster_name(r#"a<b>c"d\e|f?g*h"#), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_cluster_name("plain-name.v2"), "plain-name.v2");
    }

    #[test]
    fn path_uses_sanitized_name() {
        let store = FileStateStore::new("/state");
        assert_eq!(store.path_for("team/a"), PathBuf::from("/state/team_a.yaml"));
    }

    #[tokio::test]
    async fn missing_state_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(store.load("c1").await.is_none());
    }

    #[tokio::test]
    async fn saved_state_loads_back_equal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested"));

        let path = store.save(&sample()).await.unwrap();
        assert_eq!(path, store.path_for("c1"));
        assert!(!path.with_extension("yaml.tmp").exists());

        assert_eq!(store.load("c1").await, Some(sample()));
    }

    /// Story: a re-apply replaces the record wholesale; removed groups do
    /// not linger in the stored file.
    #[tokio::test]
    async fn save_replaces_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        store.save(&sample()).await.unwrap();
        let replacement = ClusterSpecification::new("c1", "ams").with_high_availability(false);
        store.save(&replacement).await.unwrap();

        assert_eq!(store.load("c1").await, Some(replacement));
    }

    #[tokio::test]
    async fn corrupt_or_empty_state_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        std::fs::write(store.path_for("broken"), "workerGroups: [not, a, map").unwrap();
        assert!(store.load("broken").await.is_none());

        std::fs::write(store.path_for("empty"), "\n").unwrap();
        assert!(store.load("empty").await.is_none());
    }

    #[tokio::test]
    async fn unwritable_location_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = FileStateStore::new(&blocker);

        let err = store.save(&sample()).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { ref cluster, .. } if cluster == "c1"));
    }
}
