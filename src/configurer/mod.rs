//! Configuration orchestrator
//!
//! [`Configurer`] composes the validator, state store, diff engine and
//! manifest renderer into the single front-end operation
//! [`Configurer::configure`]:
//!
//! ```text
//! validate -> lock -> load -> diff -> [apply: defaults -> render -> save -> write] -> respond
//! ```
//!
//! Rendering happens in memory before anything is persisted, so a defaults
//! fault leaves the stored state untouched, and a failed save never leaves a
//! manifest behind.

mod response;

pub use response::{ConfigureMode, ConfigureResponse};

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};

use crate::cluster::{validate_request, ClusterSpecification};
use crate::defaults::DefaultsSource;
use crate::diff::diff;
use crate::provider::{render_manifest_stream, Provider, VultrProvider};
use crate::store::{
    sanitize_cluster_name, FileManifestWriter, FileStateStore, ManifestWriter, StateStore,
};
use crate::Result;

/// Per-cluster mutual exclusion keyed by sanitized cluster name
///
/// Holding a cluster's lock makes load, compare and write one step with
/// respect to other requests for the same cluster. Requests for different
/// clusters never contend. An entry lives only while some request holds or
/// waits for it.
#[derive(Debug, Default)]
pub struct ClusterLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ClusterLocks {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }

    /// Wait for exclusive access to a cluster
    pub async fn acquire(&self, cluster_name: &str) -> ClusterLockGuard<'_> {
        let key = sanitize_cluster_name(cluster_name);
        let guard = self.lock_for(&key).lock_owned().await;
        ClusterLockGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one cluster; released on drop
#[derive(Debug)]
pub struct ClusterLockGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ClusterLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's handle left: nobody holds or waits for the lock.
        // lock_for clones under the same shard lock.
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// The configuration diff-and-render engine
pub struct Configurer {
    store: Arc<dyn StateStore>,
    manifests: Arc<dyn ManifestWriter>,
    defaults: Arc<dyn DefaultsSource>,
    provider: Arc<dyn Provider>,
    locks: ClusterLocks,
}

impl Configurer {
    /// Create a configurer from its collaborators
    pub fn new(
        store: Arc<dyn StateStore>,
        manifests: Arc<dyn ManifestWriter>,
        defaults: Arc<dyn DefaultsSource>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            store,
            manifests,
            defaults,
            provider,
            locks: ClusterLocks::default(),
        }
    }

    /// File-backed configurer rendering for Vultr
    pub fn with_directories(
        state_dir: impl Into<PathBuf>,
        manifests_dir: impl Into<PathBuf>,
        defaults: Arc<dyn DefaultsSource>,
    ) -> Self {
        Self::new(
            Arc::new(FileStateStore::new(state_dir)),
            Arc::new(FileManifestWriter::new(manifests_dir)),
            defaults,
            Arc::new(VultrProvider::new()),
        )
    }

    /// Validate a request, compare it with the persisted state and, in
    /// [`ConfigureMode::Apply`], persist it and write its manifests
    ///
    /// Returns either a complete report or exactly one error. A validation
    /// error touches no collaborator.
    #[instrument(skip(self, body))]
    pub async fn configure(
        &self,
        body: &serde_json::Value,
        mode: ConfigureMode,
    ) -> Result<ConfigureResponse> {
        let spec = validate_request(body)?;

        let _guard = self.locks.acquire(&spec.cluster_name).await;

        let previous = self.store.load(&spec.cluster_name).await;
        let changes = diff(previous.as_ref(), &spec);
        let response = ConfigureResponse::new(&spec, mode, changes);

        if mode == ConfigureMode::Preview {
            info!(
                cluster = %spec.cluster_name,
                changes_detected = response.changes_detected,
                "previewed configuration"
            );
            return Ok(response);
        }

        let stream = self.render(&spec).await?;
        let config_file = self.store.save(&spec).await?;
        let manifest_file = self.manifests.write(&spec.cluster_name, &stream).await?;

        info!(
            cluster = %spec.cluster_name,
            changes_detected = response.changes_detected,
            "applied configuration"
        );
        Ok(response.with_files(config_file, manifest_file))
    }

    /// Front-end entry point: apply when `apply` is set, otherwise preview
    pub async fn apply_or_preview(
        &self,
        body: &serde_json::Value,
        apply: bool,
    ) -> Result<ConfigureResponse> {
        self.configure(body, ConfigureMode::from_apply_flag(apply)).await
    }

    /// Persist and render a request
    pub async fn apply(&self, body: &serde_json::Value) -> Result<ConfigureResponse> {
        self.configure(body, ConfigureMode::Apply).await
    }

    /// Report what applying a request would change
    pub async fn preview(&self, body: &serde_json::Value) -> Result<ConfigureResponse> {
        self.configure(body, ConfigureMode::Preview).await
    }

    /// Render the manifest stream for a specification without touching state
    pub async fn render(&self, spec: &ClusterSpecification) -> Result<String> {
        let defaults = self.defaults.get_defaults().await?;
        let manifests = self.provider.generate_capi_manifests(spec, &defaults)?;
        render_manifest_stream(&manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::WorkerGroup;
    use crate::defaults::{ManifestDefaults, MockDefaultsSource};
    use crate::store::{MockManifestWriter, MockStateStore};
    use crate::Error;
    use mockall::Sequence;
    use serde_json::json;

    fn request() -> serde_json::Value {
        json!({
            "region": "ewr",
            "clusterName": "c1",
            "workerGroups": {
                "w1": {"count": 2, "planId": "p1"}
            }
        })
    }

    fn stored() -> ClusterSpecification {
        ClusterSpecification::new("c1", "ewr").with_worker_group("w1", WorkerGroup::new(1, "p1"))
    }

    fn working_defaults() -> MockDefaultsSource {
        let mut defaults = MockDefaultsSource::new();
        defaults
            .expect_get_defaults()
            .returning(|| Ok(ManifestDefaults::default()));
        defaults
    }

    fn configurer(
        store: MockStateStore,
        manifests: MockManifestWriter,
        defaults: MockDefaultsSource,
    ) -> Configurer {
        Configurer::new(
            Arc::new(store),
            Arc::new(manifests),
            Arc::new(defaults),
            Arc::new(VultrProvider::new()),
        )
    }

    /// Story: a preview reports the diff and has no side effects.
    #[tokio::test]
    async fn preview_never_saves_or_writes() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Some(stored()));
        store.expect_save().never();
        let mut manifests = MockManifestWriter::new();
        manifests.expect_write().never();
        let mut defaults = MockDefaultsSource::new();
        defaults.expect_get_defaults().never();

        let response = configurer(store, manifests, defaults)
            .preview(&request())
            .await
            .unwrap();

        assert!(response.changes_detected);
        assert!(response.config_file.is_none());
        assert!(response.manifest_file.is_none());
        let modified = response.changes.modification("w1").unwrap();
        assert_eq!(modified.changes.fields(), vec!["count"]);
    }

    #[tokio::test]
    async fn apply_saves_state_before_writing_manifests() {
        let mut seq = Sequence::new();
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| None);
        store
            .expect_save()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|spec| {
                assert_eq!(spec.cluster_name, "c1");
                assert_eq!(spec.worker_groups["w1"].count, 2);
                Ok(PathBuf::from("state/c1.yaml"))
            });
        let mut manifests = MockManifestWriter::new();
        manifests
            .expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name, stream| {
                assert_eq!(name, "c1");
                assert!(stream.contains("kind: MachineDeployment"));
                Ok(PathBuf::from("out/c1/cluster-template.yaml"))
            });

        let response = configurer(store, manifests, working_defaults())
            .apply(&request())
            .await
            .unwrap();

        assert!(response.changes_detected);
        assert_eq!(response.config_file, Some(PathBuf::from("state/c1.yaml")));
        assert_eq!(
            response.manifest_file,
            Some(PathBuf::from("out/c1/cluster-template.yaml"))
        );
        assert_eq!(response.changes.worker_groups_added.len(), 1);
    }

    /// Story: when the state cannot be saved no manifest is produced and
    /// the caller gets the persistence error.
    #[tokio::test]
    async fn failed_save_writes_no_manifest() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Some(stored()));
        store
            .expect_save()
            .returning(|spec| Err(Error::persistence(&spec.cluster_name, "disk full")));
        let mut manifests = MockManifestWriter::new();
        manifests.expect_write().never();

        let err = configurer(store, manifests, working_defaults())
            .apply(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn defaults_fault_leaves_state_untouched() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Some(stored()));
        store.expect_save().never();
        let mut manifests = MockManifestWriter::new();
        manifests.expect_write().never();
        let mut defaults = MockDefaultsSource::new();
        defaults.expect_get_defaults().returning(|| {
            Err(Error::render_configuration(
                "missing required field 'controlPlanePlan' in defaults",
            ))
        });

        let err = configurer(store, manifests, defaults)
            .apply(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RenderConfiguration(_)));
    }

    #[tokio::test]
    async fn manifest_write_failure_is_reported() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| None);
        store
            .expect_save()
            .returning(|_| Ok(PathBuf::from("state/c1.yaml")));
        let mut manifests = MockManifestWriter::new();
        manifests
            .expect_write()
            .returning(|name, _| Err(Error::persistence(name, "read-only filesystem")));

        let err = configurer(store, manifests, working_defaults())
            .apply(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence { ref cluster, .. } if cluster == "c1"));
    }

    #[tokio::test]
    async fn invalid_request_touches_no_collaborator() {
        let mut store = MockStateStore::new();
        store.expect_load().never();
        store.expect_save().never();
        let mut manifests = MockManifestWriter::new();
        manifests.expect_write().never();
        let mut defaults = MockDefaultsSource::new();
        defaults.expect_get_defaults().never();

        let err = configurer(store, manifests, defaults)
            .apply(&json!({"region": "ewr"}))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.field(), Some("clusterName"));
    }

    #[tokio::test]
    async fn render_uses_defaults_without_touching_state() {
        let mut store = MockStateStore::new();
        store.expect_load().never();
        store.expect_save().never();
        let mut manifests = MockManifestWriter::new();
        manifests.expect_write().never();

        let stream = configurer(store, manifests, working_defaults())
            .render(&stored())
            .await
            .unwrap();

        assert!(stream.contains("kind: Cluster\n"));
        assert!(stream.contains("planID: vc2-2c-2gb"));
        assert!(stream.contains("version: v1.32.4"));
    }

    #[test]
    fn locks_are_shared_per_sanitized_name() {
        let locks = ClusterLocks::default();
        let key = sanitize_cluster_name("team/a");
        assert!(Arc::ptr_eq(&locks.lock_for(&key), &locks.lock_for("team_a")));
        assert!(!Arc::ptr_eq(&locks.lock_for("a"), &locks.lock_for("b")));
    }

    /// Story: a long-lived front end sees many cluster names; the lock table
    /// does not keep one entry per name forever.
    #[tokio::test]
    async fn released_locks_leave_no_entries() {
        let locks = ClusterLocks::default();
        for i in 0..1000 {
            let _guard = locks.acquire(&format!("cluster-{i}")).await;
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_another_request_waits() {
        let locks = ClusterLocks::default();
        let guard = locks.acquire("c1").await;
        let waiting = locks.lock_for("c1");

        drop(guard);
        assert_eq!(locks.len(), 1);

        drop(waiting);
        drop(locks.acquire("c1").await);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn second_request_waits_for_first() {
        let locks = ClusterLocks::default();
        let first = locks.acquire("c1").await;

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            locks.acquire("c1"),
        )
        .await;
        assert!(blocked.is_err());

        drop(first);
        let _second = locks.acquire("c1").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn finished_requests_release_their_locks() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| None);
        store
            .expect_save()
            .returning(|_| Ok(PathBuf::from("state/c1.yaml")));
        let mut manifests = MockManifestWriter::new();
        manifests
            .expect_write()
            .returning(|_, _| Ok(PathBuf::from("out/c1/cluster-template.yaml")));
        let configurer = configurer(store, manifests, working_defaults());

        configurer.apply_or_preview(&request(), false).await.unwrap();
        let response = configurer.apply_or_preview(&request(), true).await.unwrap();
        configurer
            .apply_or_preview(&json!({"region": "ewr"}), true)
            .await
            .unwrap_err();

        assert!(response.manifest_file.is_some());
        assert_eq!(configurer.locks.len(), 0);
    }
}
