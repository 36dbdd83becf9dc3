//! Cluster desired-state model and request validation
//!
//! [`ClusterSpecification`] is the canonical, strongly typed form of a
//! cluster's desired state. Untyped request documents only exist at the
//! boundary: [`validate_request`] converts them immediately and nothing past
//! it ever sees the raw form.

mod types;
mod validate;

pub use types::{ClusterSpecification, TaintEffect, WorkerGroup};
pub use validate::validate_request;
