//! Types describing a cluster's desired state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scheduling taint effect applied to every node of a worker group
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum TaintEffect {
    /// Pods without a toleration are never scheduled
    NoSchedule,
    /// Scheduler avoids the node when possible
    PreferNoSchedule,
    /// Running pods without a toleration are evicted
    NoExecute,
}

impl TaintEffect {
    /// All accepted values, in the order they are reported to callers
    pub const ALL: [TaintEffect; 3] = [
        TaintEffect::NoSchedule,
        TaintEffect::PreferNoSchedule,
        TaintEffect::NoExecute,
    ];

    /// Kubernetes spelling of the effect
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSchedule => "NoSchedule",
            Self::PreferNoSchedule => "PreferNoSchedule",
            Self::NoExecute => "NoExecute",
        }
    }
}

impl std::str::FromStr for TaintEffect {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|effect| effect.as_str() == s)
            .ok_or_else(|| {
                crate::Error::validation(format!(
                    "invalid taint effect: {s}, expected one of: NoSchedule, PreferNoSchedule, NoExecute"
                ))
            })
    }
}

impl std::fmt::Display for TaintEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, homogeneous pool of worker machines
///
/// Compared by value. An unset taint is kept as `None`; no default effect is
/// substituted here, so "unset" and an explicit `PreferNoSchedule` are
/// different worker groups.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct WorkerGroup {
    /// Number of machines (always at least 1)
    pub count: u32,

    /// Infrastructure sizing plan (e.g. "vc2-4c-8gb")
    pub plan_id: String,

    /// Optional scheduling taint for the group's nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taint_effect: Option<TaintEffect>,
}

impl WorkerGroup {
    /// Create a worker group without a taint
    pub fn new(count: u32, plan_id: impl Into<String>) -> Self {
        Self {
            count,
            plan_id: plan_id.into(),
            taint_effect: None,
        }
    }

    /// Set the taint effect
    pub fn with_taint(mut self, effect: TaintEffect) -> Self {
        self.taint_effect = Some(effect);
        self
    }
}

fn default_high_availability() -> bool {
    true
}

/// Desired state for one cluster
///
/// Every apply replaces the whole specification. The serialized field order
/// is also the persisted file's key order, and `worker_groups` is a
/// `BTreeMap` so group keys are written in a stable order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpecification {
    /// Infrastructure region (e.g. "ewr")
    pub region: String,

    /// Cluster name, also the storage key once sanitized
    pub cluster_name: String,

    /// Run three control plane nodes instead of one
    #[serde(default = "default_high_availability")]
    pub control_plane_high_availability: bool,

    /// Worker groups keyed by group name
    #[serde(default)]
    pub worker_groups: BTreeMap<String, WorkerGroup>,
}

impl ClusterSpecification {
    /// Create a highly available specification with no worker groups
    pub fn new(cluster_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            cluster_name: cluster_name.into(),
            control_plane_high_availability: true,
            worker_groups: BTreeMap::new(),
        }
    }

    /// Add or replace a worker group
    pub fn with_worker_group(mut self, name: impl Into<String>, group: WorkerGroup) -> Self {
        self.worker_groups.insert(name.into(), group);
        self
    }

    /// Set control plane high availability
    pub fn with_high_availability(mut self, enabled: bool) -> Self {
        self.control_plane_high_availability = enabled;
        self
    }
}
