//! Request validation
//!
//! Turns an untyped request document into a [`ClusterSpecification`]. The
//! first offending field fails the whole request; errors are not aggregated.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{ClusterSpecification, TaintEffect, WorkerGroup};
use crate::{Error, Result};

const REQUIRED_FIELDS: [&str; 2] = ["region", "clusterName"];

/// Validate and normalize a desired-state request
///
/// `region` and `clusterName` are required non-empty strings (trimmed).
/// `controlPlaneHighAvailability` defaults to `true` and must be a boolean
/// when present. `workerGroups`, when present, must map group names to
/// objects holding `count` (>= 1), `planId` and an optional `taintEffect`.
pub fn validate_request(body: &Value) -> Result<ClusterSpecification> {
    let doc = body
        .as_object()
        .ok_or_else(|| Error::validation("Request body must be a JSON object"))?;

    for field in REQUIRED_FIELDS {
        if !doc.contains_key(field) {
            return Err(Error::validation_for_field(
                field,
                format!("Missing required field: '{field}'"),
            ));
        }
    }

    let region = required_string(doc, "region")?;
    let cluster_name = required_string(doc, "clusterName")?;
    // the name becomes a file and directory name under the storage roots
    if cluster_name == "." || cluster_name == ".." {
        return Err(Error::validation_for_field(
            "clusterName",
            format!("'clusterName' must not be '{cluster_name}'"),
        ));
    }

    let control_plane_high_availability = match doc.get("controlPlaneHighAvailability") {
        None => true,
        Some(Value::Bool(enabled)) => *enabled,
        Some(_) => {
            return Err(Error::validation_for_field(
                "controlPlaneHighAvailability",
                "'controlPlaneHighAvailability' must be a boolean",
            ))
        }
    };

    let worker_groups = match doc.get("workerGroups") {
        None => BTreeMap::new(),
        Some(Value::Object(groups)) => groups
            .iter()
            .map(|(name, data)| Ok((name.clone(), parse_worker_group(name, data)?)))
            .collect::<Result<BTreeMap<_, _>>>()?,
        Some(_) => {
            return Err(Error::validation_for_field(
                "workerGroups",
                "'workerGroups' must be an object",
            ))
        }
    };

    Ok(ClusterSpecification {
        region,
        cluster_name,
        control_plane_high_availability,
        worker_groups,
    })
}

fn required_string(doc: &Map<String, Value>, field: &str) -> Result<String> {
    match doc.get(field).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(Error::validation_for_field(
            field,
            format!("'{field}' must be a non-empty string"),
        )),
    }
}

fn parse_worker_group(name: &str, data: &Value) -> Result<WorkerGroup> {
    let field = |attr: &str| format!("workerGroups.{name}.{attr}");

    if name.trim().is_empty() {
        return Err(Error::validation_for_field(
            "workerGroups",
            "Worker group names must be non-empty strings",
        ));
    }

    let group = data.as_object().ok_or_else(|| {
        Error::validation_for_field(
            format!("workerGroups.{name}"),
            format!("Worker group '{name}' must be an object"),
        )
    })?;

    let count = group.get("count").ok_or_else(|| {
        Error::validation_for_field(
            field("count"),
            format!("Worker group '{name}' missing 'count' field"),
        )
    })?;
    let plan_id = group.get("planId").ok_or_else(|| {
        Error::validation_for_field(
            field("planId"),
            format!("Worker group '{name}' missing 'planId' field"),
        )
    })?;

    let count = count.as_i64().ok_or_else(|| {
        Error::validation_for_field(
            field("count"),
            format!("Worker group '{name}' count must be an integer"),
        )
    })?;
    if count < 1 {
        return Err(Error::validation_for_field(
            field("count"),
            format!(
                "Worker group '{name}' count must be at least 1. \
                 To remove a worker group, omit it from the request entirely."
            ),
        ));
    }
    let count = u32::try_from(count).map_err(|_| {
        Error::validation_for_field(
            field("count"),
            format!("Worker group '{name}' count must be at most {}", u32::MAX),
        )
    })?;

    let plan_id = match plan_id.as_str().map(str::trim) {
        Some(plan) if !plan.is_empty() => plan.to_string(),
        _ => {
            return Err(Error::validation_for_field(
                field("planId"),
                format!("Worker group '{name}' planId must be a non-empty string"),
            ))
        }
    };

    let invalid_taint = || {
        Error::validation_for_field(
            field("taintEffect"),
            format!(
                "Worker group '{name}' taintEffect must be one of: NoSchedule, PreferNoSchedule, NoExecute"
            ),
        )
    };
    // null and "" both mean "no taint requested"
    let taint_effect = match group.get("taintEffect") {
        None | Some(Value::Null) => None,
        Some(Value::String(effect)) if effect.is_empty() => None,
        Some(Value::String(effect)) => Some(
            effect
                .parse::<TaintEffect>()
                .map_err(|_| invalid_taint())?,
        ),
        Some(_) => return Err(invalid_taint()),
    };

    Ok(WorkerGroup {
        count,
        plan_id,
        taint_effect,
    })
}
