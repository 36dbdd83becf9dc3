//! Error types for the configurer
//!
//! Every failure is returned to the caller as exactly one of these variants.
//! Nothing is retried inside the crate; retry policy belongs to whatever
//! front end wraps [`crate::configurer::Configurer`].

use thiserror::Error;

/// Main error type for configuration operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed, missing or out-of-range request input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending field path (e.g. "workerGroups.gpu.count")
        field: Option<String>,
    },

    /// Referenced cluster or resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Persisting cluster state or manifests failed
    #[error("persistence error for {cluster}: {message}")]
    Persistence {
        /// Name of the cluster being written
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Manifest defaults are missing or unusable
    #[error("render configuration error: {0}")]
    RenderConfiguration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Caller-visible error category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong; the caller must fix it
    BadRequest,
    /// A referenced entity does not exist
    NotFound,
    /// Something failed on our side
    Internal,
}

impl ErrorKind {
    /// Human readable category name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::NotFound => "not found",
            Self::Internal => "internal error",
        }
    }

    /// HTTP-style status code for this category
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a validation error without a field path
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a persistence error for a cluster
    pub fn persistence(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Persistence {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a render configuration error
    pub fn render_configuration(msg: impl Into<String>) -> Self {
        Self::RenderConfiguration(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Category of this error as seen by the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::BadRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Persistence { .. }
            | Error::RenderConfiguration(_)
            | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Field path of a validation error, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Build the error document a front end returns to its client
    pub fn to_document(&self) -> serde_json::Value {
        let message = match self {
            Error::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        serde_json::json!({
            "error": true,
            "kind": self.kind().as_str(),
            "message": message,
            "status_code": self.status_code(),
        })
    }
}
