//! Structural comparison of two cluster specifications
//!
//! [`diff`] compares the last persisted specification (if any) with a new
//! one and produces an itemized [`ChangeReport`]: cluster-level transitions,
//! and added, deleted and modified worker groups. Unchanged groups produce
//! no entry at all.
//!
//! The report serializes to the change document returned to callers.

use serde::Serialize;
use tracing::info;

use crate::cluster::{ClusterSpecification, TaintEffect, WorkerGroup};

/// A cluster-level attribute that changed: `{previous, current}`
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Transition<T> {
    /// Value in the persisted specification
    pub previous: T,
    /// Value in the incoming specification
    pub current: T,
}

/// A worker group attribute that changed: `{previous, new}`
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FieldChange<T> {
    /// Value in the persisted specification
    pub previous: T,
    /// Value in the incoming specification
    pub new: T,
}

impl<T: PartialEq> FieldChange<T> {
    fn between(previous: T, new: T) -> Option<Self> {
        (previous != new).then_some(Self { previous, new })
    }
}

/// Per-attribute changes of a modified worker group
///
/// Only changed attributes are present.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerGroupChanges {
    /// Machine count change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<FieldChange<u32>>,
    /// Sizing plan change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<FieldChange<String>>,
    /// Taint change; `null` on either side means "unset"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taint_effect: Option<FieldChange<Option<TaintEffect>>>,
}

impl WorkerGroupChanges {
    fn between(old: &WorkerGroup, new: &WorkerGroup) -> Self {
        Self {
            count: FieldChange::between(old.count, new.count),
            plan_id: FieldChange::between(old.plan_id.clone(), new.plan_id.clone()),
            taint_effect: FieldChange::between(old.taint_effect, new.taint_effect),
        }
    }

    /// Names of the changed attributes, in document spelling
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.count.is_some() {
            fields.push("count");
        }
        if self.plan_id.is_some() {
            fields.push("planId");
        }
        if self.taint_effect.is_some() {
            fields.push("taintEffect");
        }
        fields
    }

    /// True when no attribute changed
    pub fn is_empty(&self) -> bool {
        self.count.is_none() && self.plan_id.is_none() && self.taint_effect.is_none()
    }
}

/// A worker group that only exists on one side of the comparison
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WorkerGroupEntry {
    /// Group name
    pub name: String,
    /// Full group configuration
    pub config: WorkerGroup,
}

/// A worker group present on both sides with different attributes
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WorkerGroupModification {
    /// Group name
    pub name: String,
    /// Persisted configuration
    pub previous_config: WorkerGroup,
    /// Incoming configuration
    pub new_config: WorkerGroup,
    /// Changed attributes only
    pub changes: WorkerGroupChanges,
}

/// Differences between the persisted and the incoming specification
///
/// List order is not meaningful; compare by membership.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ChangeReport {
    /// Region transition, if the region changed
    pub region: Option<Transition<String>>,
    /// HA transition, if the flag changed
    pub control_plane_high_availability: Option<Transition<bool>>,
    /// Groups only in the incoming specification
    pub worker_groups_added: Vec<WorkerGroupEntry>,
    /// Groups on both sides whose attributes differ
    pub worker_groups_modified: Vec<WorkerGroupModification>,
    /// Groups only in the persisted specification
    pub worker_groups_deleted: Vec<WorkerGroupEntry>,
    /// No persisted specification existed
    #[serde(skip)]
    pub new_cluster: bool,
}

impl ChangeReport {
    /// True when the incoming specification differs from the persisted one
    ///
    /// A cluster with no persisted state always has changes, even with no
    /// worker groups.
    pub fn has_changes(&self) -> bool {
        self.new_cluster
            || self.region.is_some()
            || self.control_plane_high_availability.is_some()
            || !self.worker_groups_added.is_empty()
            || !self.worker_groups_modified.is_empty()
            || !self.worker_groups_deleted.is_empty()
    }

    /// Previous region, if it changed
    pub fn previous_region(&self) -> Option<&str> {
        self.region.as_ref().map(|t| t.previous.as_str())
    }

    /// Previous HA flag, if it changed
    pub fn previous_control_plane_ha(&self) -> Option<bool> {
        self.control_plane_high_availability
            .as_ref()
            .map(|t| t.previous)
    }

    /// Find the modification record for a group
    pub fn modification(&self, name: &str) -> Option<&WorkerGroupModification> {
        self.worker_groups_modified.iter().find(|m| m.name == name)
    }
}

fn entries<'a>(
    spec: &'a ClusterSpecification,
    names: impl Iterator<Item = &'a String>,
) -> Vec<WorkerGroupEntry> {
    names
        .map(|name| WorkerGroupEntry {
            name: name.clone(),
            config: spec.worker_groups[name].clone(),
        })
        .collect()
}

fn joined(entries: &[WorkerGroupEntry]) -> String {
    entries
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare the persisted specification (`old`) with an incoming one
///
/// With no persisted specification every incoming group is an addition and
/// no cluster-level transition is reported.
pub fn diff(old: Option<&ClusterSpecification>, new: &ClusterSpecification) -> ChangeReport {
    let Some(old) = old else {
        return ChangeReport {
            worker_groups_added: entries(new, new.worker_groups.keys()),
            new_cluster: true,
            ..Default::default()
        };
    };

    let mut report = ChangeReport::default();

    if old.region != new.region {
        info!(previous = %old.region, current = %new.region, "region changed");
        report.region = Some(Transition {
            previous: old.region.clone(),
            current: new.region.clone(),
        });
    }

    if old.control_plane_high_availability != new.control_plane_high_availability {
        info!(
            previous = old.control_plane_high_availability,
            current = new.control_plane_high_availability,
            "control plane HA changed"
        );
        report.control_plane_high_availability = Some(Transition {
            previous: old.control_plane_high_availability,
            current: new.control_plane_high_availability,
        });
    }

    report.worker_groups_added = entries(
        new,
        new.worker_groups
            .keys()
            .filter(|name| !old.worker_groups.contains_key(*name)),
    );
    if !report.worker_groups_added.is_empty() {
        info!(groups = %joined(&report.worker_groups_added), "worker groups added");
    }

    report.worker_groups_deleted = entries(
        old,
        old.worker_groups
            .keys()
            .filter(|name| !new.worker_groups.contains_key(*name)),
    );
    if !report.worker_groups_deleted.is_empty() {
        info!(groups = %joined(&report.worker_groups_deleted), "worker groups deleted");
    }

    for (name, new_group) in &new.worker_groups {
        let Some(old_group) = old.worker_groups.get(name) else {
            continue;
        };
        let changes = WorkerGroupChanges::between(old_group, new_group);
        if changes.is_empty() {
            continue;
        }
        info!(
            group = %name,
            count = %format!("{} -> {}", old_group.count, new_group.count),
            plan_id = %format!("{} -> {}", old_group.plan_id, new_group.plan_id),
            fields = ?changes.fields(),
            "worker group modified"
        );
        report.worker_groups_modified.push(WorkerGroupModification {
            name: name.clone(),
            previous_config: old_group.clone(),
            new_config: new_group.clone(),
            changes,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[WorkerGroupEntry]) -> Vec<&str> {
        let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn sample() -> ClusterSpecification {
        ClusterSpecification::new("c1", "ewr")
            .with_worker_group(
                "system",
                WorkerGroup::new(2, "vc2-2c-4gb").with_taint(TaintEffect::NoExecute),
            )
            .with_worker_group("apps", WorkerGroup::new(3, "vc2-4c-8gb"))
    }

    #[test]
    fn no_previous_state_marks_everything_added() {
        let spec = sample();
        let report = diff(None, &spec);

        assert!(report.has_changes());
        assert_eq!(names(&report.worker_groups_added), vec!["apps", "system"]);
        assert!(report.worker_groups_modified.is_empty());
        assert!(report.worker_groups_deleted.is_empty());
        assert!(report.previous_region().is_none());
        assert!(report.previous_control_plane_ha().is_none());
    }

    #[test]
    fn new_cluster_without_groups_still_has_changes() {
        let report = diff(None, &ClusterSpecification::new("c1", "ewr"));
        assert!(report.has_changes());
        assert!(report.worker_groups_added.is_empty());
    }

    #[test]
    fn identical_specifications_have_no_changes() {
        let spec = sample();
        let report = diff(Some(&spec), &spec.clone());

        assert!(!report.has_changes());
        assert_eq!(report, ChangeReport::default());
    }

    #[test]
    fn region_and_ha_transitions_are_recorded() {
        let old = sample();
        let new = sample().with_high_availability(false);
        let new = ClusterSpecification {
            region: "ams".to_string(),
            ..new
        };
        let report = diff(Some(&old), &new);

        assert!(report.has_changes());
        assert_eq!(
            report.region,
            Some(Transition {
                previous: "ewr".to_string(),
                current: "ams".to_string()
            })
        );
        assert_eq!(report.previous_control_plane_ha(), Some(true));
        assert!(report.worker_groups_modified.is_empty());
    }

    #[test]
    fn groups_are_added_and_deleted_by_name() {
        let old = sample();
        let mut new = sample();
        new.worker_groups.remove("system");
        new.worker_groups
            .insert("gpu".to_string(), WorkerGroup::new(1, "vcg-a100"));

        let report = diff(Some(&old), &new);
        assert_eq!(names(&report.worker_groups_added), vec!["gpu"]);
        assert_eq!(names(&report.worker_groups_deleted), vec!["system"]);
        assert_eq!(
            report.worker_groups_deleted[0].config,
            old.worker_groups["system"]
        );
        assert!(report.worker_groups_modified.is_empty());
    }

    /// Story: changing exactly one attribute of a group reports exactly that
    /// attribute, with both full snapshots attached for context.
    #[test]
    fn single_attribute_changes_are_isolated() {
        let base = WorkerGroup::new(2, "p1");
        let variants = [
            (WorkerGroup::new(5, "p1"), "count"),
            (WorkerGroup::new(2, "p2"), "planId"),
            (base.clone().with_taint(TaintEffect::NoSchedule), "taintEffect"),
        ];

        for (changed, field) in variants {
            let old = ClusterSpecification::new("c1", "ewr").with_worker_group("w1", base.clone());
            let new =
                ClusterSpecification::new("c1", "ewr").with_worker_group("w1", changed.clone());
            let report = diff(Some(&old), &new);

            let modification = report.modification("w1").expect("w1 modified");
            assert_eq!(modification.changes.fields(), vec![field]);
            assert_eq!(modification.previous_config, base);
            assert_eq!(modification.new_config, changed);
        }
    }

    #[test]
    fn count_and_plan_changes_carry_previous_and_new() {
        let old = ClusterSpecification::new("c1", "ewr")
            .with_worker_group("w1", WorkerGroup::new(2, "p1"));
        let new = ClusterSpecification::new("c1", "ams")
            .with_worker_group("w1", WorkerGroup::new(4, "p2"));
        let report = diff(Some(&old), &new);

        let changes = &report.modification("w1").unwrap().changes;
        assert_eq!(changes.count, Some(FieldChange { previous: 2, new: 4 }));
        assert_eq!(
            changes.plan_id,
            Some(FieldChange {
                previous: "p1".to_string(),
                new: "p2".to_string()
            })
        );
        assert!(changes.taint_effect.is_none());
        assert_eq!(report.previous_region(), Some("ewr"));
    }

    /// Story: explicitly asking for the render-time default taint still
    /// counts as a change, because the stored value differs.
    #[test]
    fn unset_to_prefer_no_schedule_is_a_modification() {
        let old = ClusterSpecification::new("c1", "ewr")
            .with_worker_group("w1", WorkerGroup::new(1, "p1"));
        let new = ClusterSpecification::new("c1", "ewr").with_worker_group(
            "w1",
            WorkerGroup::new(1, "p1").with_taint(TaintEffect::PreferNoSchedule),
        );
        let report = diff(Some(&old), &new);

        let changes = &report.modification("w1").unwrap().changes;
        assert_eq!(
            changes.taint_effect,
            Some(FieldChange {
                previous: None,
                new: Some(TaintEffect::PreferNoSchedule)
            })
        );
    }

    #[test]
    fn report_serializes_to_change_document() {
        let old = ClusterSpecification::new("c1", "ewr")
            .with_worker_group("w1", WorkerGroup::new(2, "p1"));
        let new = ClusterSpecification::new("c1", "ewr").with_worker_group(
            "w1",
            WorkerGroup::new(2, "p1").with_taint(TaintEffect::NoExecute),
        );
        let doc = serde_json::to_value(diff(Some(&old), &new)).unwrap();

        assert!(doc["region"].is_null());
        assert!(doc["control_plane_high_availability"].is_null());
        assert_eq!(doc["worker_groups_added"], serde_json::json!([]));
        let modified = &doc["worker_groups_modified"][0];
        assert_eq!(modified["name"], "w1");
        assert_eq!(modified["previous_config"]["planId"], "p1");
        assert!(modified["changes"]["taintEffect"]["previous"].is_null());
        assert_eq!(modified["changes"]["taintEffect"]["new"], "NoExecute");
        assert!(modified["changes"].get("count").is_none());
        assert!(doc.get("new_cluster").is_none());
    }
}
