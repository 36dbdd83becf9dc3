//! Binary settings
//!
//! Every setting can be given as a flag or through its environment variable.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::warn;

use crate::configurer::Configurer;
use crate::defaults::{DefaultsSource, FileDefaults, StaticDefaults};

/// Directory holding one state file per cluster
pub const DEFAULT_STATE_DIR: &str = "cluster_configs";
/// Directory holding one manifest directory per cluster
pub const DEFAULT_MANIFESTS_DIR: &str = "capi_kubernetes";
/// Defaults document read on every render
pub const DEFAULT_DEFAULTS_FILE: &str = "configs/defaults.yaml";

/// Storage and defaults locations
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory for persisted cluster specifications
    #[arg(
        long,
        env = "CAPI_CONFIGURER_STATE_DIR",
        default_value = DEFAULT_STATE_DIR,
        global = true
    )]
    pub state_dir: PathBuf,

    /// Directory for rendered manifest streams
    #[arg(
        long,
        env = "CAPI_CONFIGURER_MANIFESTS_DIR",
        default_value = DEFAULT_MANIFESTS_DIR,
        global = true
    )]
    pub manifests_dir: PathBuf,

    /// YAML file with `kubernetesVersion` and `controlPlanePlan`
    #[arg(
        long,
        env = "CAPI_CONFIGURER_DEFAULTS_FILE",
        default_value = DEFAULT_DEFAULTS_FILE,
        global = true
    )]
    pub defaults_file: PathBuf,
}

impl Settings {
    /// Defaults source for these settings
    ///
    /// Falls back to the built-in values when the defaults file does not
    /// exist. A file that exists but is incomplete is still an error at
    /// render time.
    pub async fn defaults_source(&self) -> Arc<dyn DefaultsSource> {
        if tokio::fs::try_exists(&self.defaults_file).await.unwrap_or(false) {
            Arc::new(FileDefaults::new(&self.defaults_file))
        } else {
            warn!(
                path = %self.defaults_file.display(),
                "defaults file not found, using built-in defaults"
            );
            Arc::new(StaticDefaults::default())
        }
    }

    /// File-backed configurer for these settings
    pub async fn configurer(&self) -> Configurer {
        Configurer::with_directories(
            &self.state_dir,
            &self.manifests_dir,
            self.defaults_source().await,
        )
    }
}
