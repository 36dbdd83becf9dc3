//! Manifest defaults collaborator
//!
//! The renderer needs two values that are not part of a cluster's desired
//! state: the Kubernetes version and the control plane sizing plan. They are
//! supplied through [`DefaultsSource`] so the core can be driven with fixed
//! values in tests and with a defaults file in production.

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Kubernetes version used when no defaults file is available
pub const DEFAULT_KUBERNETES_VERSION: &str = "v1.32.4";

/// Control plane plan used when no defaults file is available
pub const DEFAULT_CONTROL_PLANE_PLAN: &str = "vc2-2c-2gb";

/// Values the renderer takes from outside the cluster specification
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDefaults {
    /// Kubernetes version (e.g. "v1.32.4")
    pub kubernetes_version: String,
    /// Sizing plan for control plane machines
    pub control_plane_plan: String,
}

impl Default for ManifestDefaults {
    fn default() -> Self {
        Self {
            kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            control_plane_plan: DEFAULT_CONTROL_PLANE_PLAN.to_string(),
        }
    }
}

impl ManifestDefaults {
    /// Extract defaults from an untyped document
    ///
    /// Both keys must be present as non-empty strings. Extra keys (such as
    /// component versions kept in the same file) are ignored.
    pub fn from_document(doc: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            kubernetes_version: required_key(doc, "kubernetesVersion")?,
            control_plane_plan: required_key(doc, "controlPlanePlan")?,
        })
    }
}

fn required_key(doc: &serde_json::Value, key: &str) -> Result<String> {
    doc.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            Error::render_configuration(format!("missing required field '{key}' in defaults"))
        })
}

/// Trait for fetching manifest defaults
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DefaultsSource: Send + Sync {
    /// Fetch the current defaults; fails if a required key is missing
    async fn get_defaults(&self) -> Result<ManifestDefaults>;
}

/// Fixed defaults
#[derive(Clone, Debug, Default)]
pub struct StaticDefaults {
    defaults: ManifestDefaults,
}

impl StaticDefaults {
    /// Create a source that always returns `defaults`
    pub fn new(defaults: ManifestDefaults) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl DefaultsSource for StaticDefaults {
    async fn get_defaults(&self) -> Result<ManifestDefaults> {
        Ok(self.defaults.clone())
    }
}

/// Defaults read from a YAML file on every request
#[derive(Clone, Debug)]
pub struct FileDefaults {
    path: PathBuf,
}

impl FileDefaults {
    /// Create a source reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DefaultsSource for FileDefaults {
    async fn get_defaults(&self) -> Result<ManifestDefaults> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::render_configuration(format!(
                "failed to read defaults from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let doc: serde_json::Value = serde_yaml::from_str(&content).map_err(|e| {
            Error::render_configuration(format!(
                "failed to parse defaults in {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let defaults = ManifestDefaults::from_document(&doc)?;
        debug!(path = %self.path.display(), "loaded manifest defaults");
        Ok(defaults)
    }
}
