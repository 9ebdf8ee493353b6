//! Error types for hearth-core.

use crate::plane::PlaneError;
use crate::registry::RegistryError;
use hearth_runtime::RuntimeError;
use thiserror::Error;

/// Result type alias for hearth-core operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during orchestrator operations.
///
/// Session bootstrap failures never appear here; they are stored on the
/// instance as a [`SessionDescriptor::Error`](crate::SessionDescriptor::Error).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Requested plane is not in the catalog
    #[error("plane not found: {0}")]
    PlaneNotFound(String),

    /// Unknown hostname
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Operation attempted on a deleted instance
    #[error("instance {0} is deleted")]
    InstanceDeleted(String),

    /// Container runtime call failed
    #[error("{context}: {source}")]
    Runtime {
        /// What the orchestrator was doing
        context: String,
        /// Underlying runtime error
        source: RuntimeError,
    },

    /// Container started without a published shell port
    #[error("no host port assigned for {0}")]
    PortAssignmentFailed(String),

    /// Snapshot ID not recorded for the instance
    #[error("snapshot {snapshot_id} not found for {hostname}")]
    SnapshotNotFound {
        /// Instance hostname
        hostname: String,
        /// Requested snapshot
        snapshot_id: String,
    },

    /// Registry could not be loaded or persisted
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Plane catalog could not be loaded
    #[error("plane catalog error: {0}")]
    Plane(#[from] PlaneError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Wrap a runtime error with what was being attempted.
    pub fn runtime(context: impl Into<String>, source: RuntimeError) -> Self {
        Self::Runtime {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only runtime failures are transient; not-found and validation
    /// conditions will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }
}
