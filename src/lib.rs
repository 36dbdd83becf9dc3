//! CAPI Configurer - desired-state configuration for Cluster API clusters
//!
//! Accepts a declarative cluster specification (region, control plane
//! topology, named worker groups), compares it with the last persisted
//! specification for that cluster, and renders the ordered set of Cluster API
//! resources that realize it.
//!
//! # Modules
//!
//! - [`cluster`] - Cluster specification types and request validation
//! - [`store`] - Persisted cluster state and manifest output
//! - [`diff`] - Structural comparison of two specifications
//! - [`defaults`] - Kubernetes version and control plane plan sources
//! - [`provider`] - CAPI manifest generation (Vultr)
//! - [`configurer`] - Apply/preview orchestration with per-cluster locking
//! - [`config`] - Binary settings
//! - [`error`] - Error types for the configurer

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod configurer;
pub mod defaults;
pub mod diff;
pub mod error;
pub mod provider;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
