//! Infrastructure provider abstraction layer
//!
//! This module provides a trait-based abstraction for infrastructure providers
//! that generate CAPI (Cluster API) manifests. Each provider implements the
//! [`Provider`] trait to generate the appropriate manifests for its infrastructure.
//!
//! # Supported Providers
//!
//! - [`VultrProvider`] - Vultr cloud via CAPVULTR
//!
//! # Naming
//!
//! Resources reference each other only by derived names:
//! `<cluster>` for the Cluster and infrastructure cluster,
//! `<cluster>-control-plane` for the control plane and its machine template,
//! and `<cluster>-<group>` for every per-worker-group resource.
//!
//! # Example
//!
//! ```text
//! let provider = VultrProvider::new();
//! let manifests = provider.generate_capi_manifests(&spec, &defaults)?;
//! let stream = render_manifest_stream(&manifests)?;
//! ```

mod vultr;

pub use vultr::VultrProvider;

use std::collections::BTreeMap;

use crate::cluster::{ClusterSpecification, TaintEffect, WorkerGroup};
use crate::defaults::ManifestDefaults;
use crate::{Error, Result};

/// A CAPI manifest represented as an untyped Kubernetes resource
///
/// This struct holds a generic Kubernetes manifest with its API version,
/// kind, metadata, and spec. It can be serialized to YAML for applying
/// to a cluster.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CAPIManifest {
    /// API version (e.g., "cluster.x-k8s.io/v1beta1")
    pub api_version: String,
    /// Kind of resource (e.g., "Cluster", "MachineDeployment")
    pub kind: String,
    /// Resource metadata
    pub metadata: ManifestMetadata,
    /// Resource spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl CAPIManifest {
    /// Create a new CAPI manifest
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ManifestMetadata {
                name: name.into(),
                namespace: None,
                labels: None,
            },
            spec: None,
        }
    }

    /// Set the spec for this manifest
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Add labels to the manifest
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels = Some(labels);
        self
    }

    /// Serialize the manifest to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::serialization(format!("{} {}: {}", self.kind, self.metadata.name, e))
        })
    }

    /// Look up a string inside the spec by JSON pointer
    #[cfg(test)]
    pub(crate) fn spec_str(&self, pointer: &str) -> Option<&str> {
        self.spec.as_ref()?.pointer(pointer)?.as_str()
    }
}

/// Metadata for a CAPI manifest
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ManifestMetadata {
    /// Name of the resource
    pub name: String,
    /// Namespace (omitted so clusterctl/kubectl pick the target namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// CAPI Cluster API version
pub const CAPI_CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
/// CAPI Bootstrap API version for KubeadmConfigTemplate
pub const CAPI_BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1beta1";
/// CAPI Control Plane API version for KubeadmControlPlane
pub const CAPI_CONTROLPLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta1";

/// Label CAPI uses to associate resources with their cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Control plane replicas with high availability
pub const HA_CONTROL_PLANE_REPLICAS: u32 = 3;
/// Control plane replicas without high availability
pub const SINGLE_CONTROL_PLANE_REPLICAS: u32 = 1;

/// Taint effect for worker groups that do not set one
pub const DEFAULT_TAINT_EFFECT: TaintEffect = TaintEffect::PreferNoSchedule;

const CONTAINERD_SOCKET: &str = "unix:///var/run/containerd/containerd.sock";
const EVICTION_HARD: &str = "nodefs.available<0%,nodefs.inodesFree<0%,imagefs.available<0%";

// ============================================================================
// Derived names and render-time rules
// ============================================================================

/// Name of the control plane and its machine template
pub fn control_plane_name(cluster_name: &str) -> String {
    format!("{cluster_name}-control-plane")
}

/// Name shared by a worker group's MachineDeployment, machine template and
/// bootstrap config template
pub fn worker_group_resource_name(cluster_name: &str, group_name: &str) -> String {
    format!("{cluster_name}-{group_name}")
}

/// Control plane replica count for the HA flag
pub fn control_plane_replicas(high_availability: bool) -> u32 {
    if high_availability {
        HA_CONTROL_PLANE_REPLICAS
    } else {
        SINGLE_CONTROL_PLANE_REPLICAS
    }
}

/// Taint effect written into the manifests for a worker group
///
/// This is the only place the default is applied; the stored specification
/// keeps an unset taint as unset.
pub fn rendered_taint_effect(group: &WorkerGroup) -> TaintEffect {
    group.taint_effect.unwrap_or(DEFAULT_TAINT_EFFECT)
}

/// Create standard labels for CAPI resources
pub fn create_cluster_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(CLUSTER_NAME_LABEL.to_string(), name.to_string());
    labels
}

/// Validate Kubernetes version format
///
/// Accepts versions in format "1.x.x" or "v1.x.x".
pub fn validate_k8s_version(version: &str) -> Result<()> {
    if !version.starts_with("1.") && !version.starts_with("v1.") {
        return Err(Error::render_configuration(format!(
            "invalid kubernetes version: {version}, expected format: 1.x.x or v1.x.x"
        )));
    }
    Ok(())
}

/// Validate defaults before any document is produced
pub fn validate_defaults(defaults: &ManifestDefaults) -> Result<()> {
    validate_k8s_version(&defaults.kubernetes_version)?;
    if defaults.control_plane_plan.trim().is_empty() {
        return Err(Error::render_configuration(
            "controlPlanePlan must be a non-empty string",
        ));
    }
    Ok(())
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Common cluster configuration for CAPI manifest generation
#[derive(Clone, Debug)]
pub struct ClusterConfig<'a> {
    /// Cluster name
    pub name: &'a str,
    /// Kubernetes version, normalized to "v1.x.y"
    pub k8s_version: String,
    /// Labels to apply to all resources
    pub labels: BTreeMap<String, String>,
}

impl<'a> ClusterConfig<'a> {
    /// Build the shared configuration for a specification
    pub fn new(spec: &'a ClusterSpecification, defaults: &ManifestDefaults) -> Self {
        Self {
            name: &spec.cluster_name,
            k8s_version: format!("v{}", defaults.kubernetes_version.trim_start_matches('v')),
            labels: create_cluster_labels(&spec.cluster_name),
        }
    }
}

/// Infrastructure provider reference configuration
#[derive(Clone, Debug)]
pub struct InfrastructureRef<'a> {
    /// Full API version (e.g., "infrastructure.cluster.x-k8s.io/v1beta1")
    pub api_version: &'a str,
    /// Kind for the infrastructure cluster (e.g., "VultrCluster")
    pub cluster_kind: &'a str,
    /// Kind for machine templates (e.g., "VultrMachineTemplate")
    pub machine_template_kind: &'a str,
    /// Kubelet provider-id template for control plane init nodes
    pub provider_id: Option<&'a str>,
}

/// Control plane specific configuration
#[derive(Clone, Debug)]
pub struct ControlPlaneConfig {
    /// Number of control plane replicas
    pub replicas: u32,
}

/// Configuration for a worker group
#[derive(Clone, Debug)]
pub struct WorkerGroupConfig<'a> {
    /// Group name (e.g. "system-workloads")
    pub name: &'a str,
    /// Worker group specification
    pub group: &'a WorkerGroup,
}

// ============================================================================
// Shared generators
// ============================================================================

fn kubelet_extra_args(provider_id: Option<&str>) -> serde_json::Value {
    let mut args = serde_json::json!({
        "cgroup-driver": "systemd",
        "eviction-hard": EVICTION_HARD,
        "cloud-provider": "external"
    });
    if let Some(id) = provider_id {
        args["provider-id"] = serde_json::json!(id);
    }
    args
}

/// Generate the main CAPI Cluster resource
///
/// The only provider-specific part is the infrastructureRef which points to
/// the provider's infrastructure cluster resource.
pub fn generate_cluster(config: &ClusterConfig, infra: &InfrastructureRef) -> CAPIManifest {
    let spec = serde_json::json!({
        "clusterNetwork": {
            "pods": {
                "cidrBlocks": ["172.25.0.0/16"]
            },
            "services": {
                "cidrBlocks": ["172.26.0.0/16"]
            }
        },
        "infrastructureRef": {
            "apiVersion": infra.api_version,
            "kind": infra.cluster_kind,
            "name": config.name
        },
        "controlPlaneRef": {
            "apiVersion": CAPI_CONTROLPLANE_API_VERSION,
            "kind": "KubeadmControlPlane",
            "name": control_plane_name(config.name)
        }
    });

    CAPIManifest::new(CAPI_CLUSTER_API_VERSION, "Cluster", config.name)
        .with_labels(config.labels.clone())
        .with_spec(spec)
}

/// Generate the KubeadmControlPlane resource
///
/// machineTemplate.infrastructureRef points to the provider's control plane
/// machine template, which shares the control plane's name.
pub fn generate_control_plane(
    config: &ClusterConfig,
    infra: &InfrastructureRef,
    cp_config: &ControlPlaneConfig,
) -> CAPIManifest {
    let cp_name = control_plane_name(config.name);

    let spec = serde_json::json!({
        "replicas": cp_config.replicas,
        "version": config.k8s_version,
        "machineTemplate": {
            "infrastructureRef": {
                "apiVersion": infra.api_version,
                "kind": infra.machine_template_kind,
                "name": cp_name
            }
        },
        "kubeadmConfigSpec": {
            "initConfiguration": {
                "nodeRegistration": {
                    "criSocket": CONTAINERD_SOCKET,
                    "kubeletExtraArgs": kubelet_extra_args(infra.provider_id)
                }
            },
            "clusterConfiguration": {
                "controllerManager": {
                    "extraArgs": {
                        "enable-hostpath-provisioner": "true",
                        "cloud-provider": "external"
                    }
                },
                "apiServer": {
                    "extraArgs": {
                        "cloud-provider": "external"
                    }
                }
            },
            "joinConfiguration": {
                "nodeRegistration": {
                    "criSocket": CONTAINERD_SOCKET,
                    "kubeletExtraArgs": kubelet_extra_args(None)
                }
            }
        }
    });

    CAPIManifest::new(CAPI_CONTROLPLANE_API_VERSION, "KubeadmControlPlane", cp_name)
        .with_labels(config.labels.clone())
        .with_spec(spec)
}

/// Generate a MachineDeployment manifest for a worker group
///
/// The bootstrap configRef and infrastructureRef both use the group's
/// derived resource name, matching the co-generated templates.
pub fn generate_machine_deployment_for_group(
    config: &ClusterConfig,
    infra: &InfrastructureRef,
    group: &WorkerGroupConfig,
) -> CAPIManifest {
    let name = worker_group_resource_name(config.name, group.name);

    let spec = serde_json::json!({
        "clusterName": config.name,
        "replicas": group.group.count,
        "selector": {
            "matchLabels": {
                CLUSTER_NAME_LABEL: config.name
            }
        },
        "template": {
            "metadata": {
                "labels": {
                    CLUSTER_NAME_LABEL: config.name,
                    format!("node-role.kubernetes.io/{}", group.name): ""
                }
            },
            "spec": {
                "clusterName": config.name,
                "version": config.k8s_version,
                "bootstrap": {
                    "configRef": {
                        "apiVersion": CAPI_BOOTSTRAP_API_VERSION,
                        "kind": "KubeadmConfigTemplate",
                        "name": name
                    }
                },
                "infrastructureRef": {
                    "apiVersion": infra.api_version,
                    "kind": infra.machine_template_kind,
                    "name": name
                }
            }
        }
    });

    CAPIManifest::new(CAPI_CLUSTER_API_VERSION, "MachineDeployment", name)
        .with_labels(config.labels.clone())
        .with_spec(spec)
}

/// Generate a KubeadmConfigTemplate for a worker group
///
/// Every node joins with a `node-role=<group>` taint; the effect falls back
/// to [`DEFAULT_TAINT_EFFECT`] when the group does not set one.
pub fn generate_kubeadm_config_template_for_group(
    config: &ClusterConfig,
    group: &WorkerGroupConfig,
) -> CAPIManifest {
    let spec = serde_json::json!({
        "template": {
            "spec": {
                "joinConfiguration": {
                    "nodeRegistration": {
                        "criSocket": CONTAINERD_SOCKET,
                        "kubeletExtraArgs": kubelet_extra_args(None),
                        "taints": [{
                            "key": "node-role",
                            "value": group.name,
                            "effect": rendered_taint_effect(group.group).as_str()
                        }]
                    }
                }
            }
        }
    });

    CAPIManifest::new(
        CAPI_BOOTSTRAP_API_VERSION,
        "KubeadmConfigTemplate",
        worker_group_resource_name(config.name, group.name),
    )
    .with_labels(config.labels.clone())
    .with_spec(spec)
}

/// Serialize manifests into one multi-document YAML stream
///
/// Documents keep their order and are separated by `---` lines.
pub fn render_manifest_stream(manifests: &[CAPIManifest]) -> Result<String> {
    let documents = manifests
        .iter()
        .map(CAPIManifest::to_yaml)
        .collect::<Result<Vec<_>>>()?;
    Ok(documents.join("---\n"))
}

/// Infrastructure provider trait for generating CAPI manifests
///
/// Generation is a pure function of the specification and the defaults.
/// Implementations check the defaults before producing anything, so a
/// configuration fault never yields a partial manifest list.
pub trait Provider: Send + Sync {
    /// Generate CAPI manifests for the given cluster, in apply order:
    /// - Cluster resource
    /// - Infrastructure-specific cluster resource
    /// - KubeadmControlPlane
    /// - Control plane machine template
    /// - Per worker group: MachineDeployment, machine template,
    ///   KubeadmConfigTemplate
    fn generate_capi_manifests(
        &self,
        spec: &ClusterSpecification,
        defaults: &ManifestDefaults,
    ) -> Result<Vec<CAPIManifest>>;
}
