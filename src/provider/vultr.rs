//! Vultr infrastructure provider
//!
//! This module implements the [`Provider`] trait for Vultr via the CAPVULTR
//! infrastructure provider.
//!
//! # Generated CAPI Resources
//!
//! 1. **Cluster** - The main CAPI cluster resource
//! 2. **VultrCluster** - Region for the cluster
//! 3. **KubeadmControlPlane** - Control plane configuration with node count
//! 4. **VultrMachineTemplate** (control plane) - Sized by the defaults' plan
//! 5. Per worker group, in group name order:
//!    **MachineDeployment**, **VultrMachineTemplate**, **KubeadmConfigTemplate**
//!
//! Image, network and SSH key IDs are emitted as `${SNAPSHOT_ID}`,
//! `${VPC_ID}` and `${SSH_KEY_ID}` for clusterctl to substitute.

use serde_json::json;
use tracing::debug;

use super::{
    control_plane_name, control_plane_replicas, generate_cluster, generate_control_plane,
    generate_kubeadm_config_template_for_group, generate_machine_deployment_for_group,
    validate_defaults, worker_group_resource_name, CAPIManifest, ClusterConfig,
    ControlPlaneConfig, InfrastructureRef, Provider, WorkerGroupConfig,
};
use crate::cluster::ClusterSpecification;
use crate::defaults::ManifestDefaults;
use crate::Result;

/// Vultr infrastructure API version
const VULTR_INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

/// Kubelet provider-id template resolved by cloud-init on the node
const VULTR_PROVIDER_ID: &str = "vultr://'{{ ds.meta_data[\"instance_id\"] }}'";

const SNAPSHOT_PLACEHOLDER: &str = "${SNAPSHOT_ID}";
const VPC_PLACEHOLDER: &str = "${VPC_ID}";
const SSH_KEY_PLACEHOLDER: &str = "${SSH_KEY_ID}";

/// Vultr infrastructure provider
#[derive(Debug, Default, Clone)]
pub struct VultrProvider;

impl VultrProvider {
    /// Create a new VultrProvider
    pub fn new() -> Self {
        Self
    }

    fn infra_ref() -> InfrastructureRef<'static> {
        InfrastructureRef {
            api_version: VULTR_INFRASTRUCTURE_API_VERSION,
            cluster_kind: "VultrCluster",
            machine_template_kind: "VultrMachineTemplate",
            provider_id: Some(VULTR_PROVIDER_ID),
        }
    }

    fn generate_vultr_cluster(config: &ClusterConfig, region: &str) -> CAPIManifest {
        CAPIManifest::new(VULTR_INFRASTRUCTURE_API_VERSION, "VultrCluster", config.name)
            .with_labels(config.labels.clone())
            .with_spec(json!({ "region": region }))
    }

    fn generate_machine_template(
        config: &ClusterConfig,
        name: String,
        plan_id: &str,
        region: &str,
    ) -> CAPIManifest {
        let spec = json!({
            "template": {
                "spec": {
                    "planID": plan_id,
                    "region": region,
                    "snapshot_id": SNAPSHOT_PLACEHOLDER,
                    "vpc_id": VPC_PLACEHOLDER,
                    "sshKey": [SSH_KEY_PLACEHOLDER]
                }
            }
        });

        CAPIManifest::new(VULTR_INFRASTRUCTURE_API_VERSION, "VultrMachineTemplate", name)
            .with_labels(config.labels.clone())
            .with_spec(spec)
    }
}

impl Provider for VultrProvider {
    fn generate_capi_manifests(
        &self,
        spec: &ClusterSpecification,
        defaults: &ManifestDefaults,
    ) -> Result<Vec<CAPIManifest>> {
        validate_defaults(defaults)?;

        let config = ClusterConfig::new(spec, defaults);
        let infra = Self::infra_ref();
        let cp_config = ControlPlaneConfig {
            replicas: control_plane_replicas(spec.control_plane_high_availability),
        };

        let mut manifests = Vec::with_capacity(4 + 3 * spec.worker_groups.len());
        manifests.push(generate_cluster(&config, &infra));
        manifests.push(Self::generate_vultr_cluster(&config, &spec.region));
        manifests.push(generate_control_plane(&config, &infra, &cp_config));
        manifests.push(Self::generate_machine_template(
            &config,
            control_plane_name(config.name),
            &defaults.control_plane_plan,
            &spec.region,
        ));

        for (name, group) in &spec.worker_groups {
            let group_config = WorkerGroupConfig { name, group };
            manifests.push(generate_machine_deployment_for_group(
                &config,
                &infra,
                &group_config,
            ));
            manifests.push(Self::generate_machine_template(
                &config,
                worker_group_resource_name(config.name, name),
                &group.plan_id,
                &spec.region,
            ));
            manifests.push(generate_kubeadm_config_template_for_group(
                &config,
                &group_config,
            ));
        }

        debug!(
            cluster = %spec.cluster_name,
            documents = manifests.len(),
            "generated CAPI manifests"
        );
        Ok(manifests)
    }
}
