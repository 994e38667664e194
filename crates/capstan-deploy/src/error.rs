//! Error types for capstan-deploy

use capstan_core::CoreError;
use thiserror::Error;

/// Result type for capstan-deploy operations
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that can occur during release operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    /// An active release with the same identity already exists
    #[error("release '{name}' already exists in namespace '{namespace}'")]
    DuplicateReleaseName { name: String, namespace: String },

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Chart could not be resolved by the chart source
    #[error("chart '{name}' not found for version {version}")]
    ChartNotFound { name: String, version: String },

    /// Cluster refused a resource; the reason is surfaced verbatim
    #[error("resource {resource} rejected by cluster: {reason}")]
    ResourceRejected { resource: String, reason: String },

    /// Resources did not become ready in time (or the operation was cancelled)
    #[error("timed out waiting for resources to become ready: {0}")]
    ReadinessTimeout(String),

    /// Rollback target is out of range or itself failed
    #[error("cannot rollback release '{name}' to revision {revision}: {reason}")]
    RollbackTargetInvalid {
        name: String,
        revision: u32,
        reason: String,
    },

    /// Reverse-apply failed during an atomic operation; manual intervention required
    #[error("automatic rollback failed, manual intervention required: {reason}")]
    RollbackFailed { reason: String },

    /// Another operation holds the release in a pending state
    #[error("another operation is in progress for release '{name}': {status}")]
    OperationInProgress { name: String, status: String },

    /// The release's status does not permit the requested operation
    #[error("cannot {operation} release '{name}' while it has status '{status}'")]
    InvalidReleaseState {
        name: String,
        status: String,
        operation: String,
    },

    /// Template rendering error
    #[error("rendering failed: {0}")]
    Render(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Value resolution error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DeployError {
    fn from(e: serde_json::Error) -> Self {
        DeployError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DeployError {
    fn from(e: serde_yaml::Error) -> Self {
        DeployError::Serialization(e.to_string())
    }
}

impl DeployError {
    /// Check if this is a release-not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeployError::ReleaseNotFound { .. })
    }
}
