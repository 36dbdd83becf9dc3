//! Response document returned for a configure request

use std::path::PathBuf;

use serde::Serialize;

use crate::cluster::ClusterSpecification;
use crate::diff::ChangeReport;

/// Whether a configure request persists its result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigureMode {
    /// Persist the new state and write the rendered manifests
    Apply,
    /// Only report the changes
    Preview,
}

impl ConfigureMode {
    /// Map the front end's boolean flag to a mode
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply {
            Self::Apply
        } else {
            Self::Preview
        }
    }
}

/// Success report for a configure request
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ConfigureResponse {
    /// Always `true`; failures are returned as [`crate::Error`]
    pub success: bool,
    /// Human readable summary
    pub message: String,
    /// Cluster the request was for
    pub cluster_name: String,
    /// Region from the request
    pub region: String,
    /// HA flag after defaulting
    pub control_plane_high_availability: bool,
    /// Number of worker groups in the request
    pub worker_groups_count: usize,
    /// Where the state was persisted (apply only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Where the manifest stream was written (apply only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_file: Option<PathBuf>,
    /// Whether the request differs from the persisted state
    pub changes_detected: bool,
    /// Itemized differences
    pub changes: ChangeReport,
}

impl ConfigureResponse {
    pub(crate) fn new(
        spec: &ClusterSpecification,
        mode: ConfigureMode,
        changes: ChangeReport,
    ) -> Self {
        let message = match mode {
            ConfigureMode::Apply => {
                format!("Configuration processed for cluster: {}", spec.cluster_name)
            }
            ConfigureMode::Preview => format!(
                "Preview of configuration changes for cluster: {}",
                spec.cluster_name
            ),
        };

        Self {
            success: true,
            message,
            cluster_name: spec.cluster_name.clone(),
            region: spec.region.clone(),
            control_plane_high_availability: spec.control_plane_high_availability,
            worker_groups_count: spec.worker_groups.len(),
            config_file: None,
            manifest_file: None,
            changes_detected: changes.has_changes(),
            changes,
        }
    }

    pub(crate) fn with_files(mut self, config_file: PathBuf, manifest_file: PathBuf) -> Self {
        self.config_file = Some(config_file);
        self.manifest_file = Some(manifest_file);
        self
    }
}
