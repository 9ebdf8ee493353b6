//! Error types for hearth-runtime.

use thiserror::Error;

/// Result type alias for hearth-runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Error returned by the Docker API client
    #[error("docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// The daemon does not know the container
    #[error("container not found: {0}")]
    NotFound(String),

    /// Another container already uses the requested name
    #[error("container name already in use: {0}")]
    Conflict(String),

    /// Exec session could not be created or streamed
    #[error("exec failed: {0}")]
    Exec(String),

    /// The container spec was rejected before reaching the daemon
    #[error("invalid container spec: {0}")]
    InvalidSpec(String),

    /// I/O error (archive export/import)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Check whether the error means the container no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Api(bollard::errors::Error::DockerResponseServerError { status_code, .. }) => {
                *status_code == 404
            }
            _ => false,
        }
    }

    /// Check whether a create failed because the name is taken.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Api(bollard::errors::Error::DockerResponseServerError { status_code, .. }) => {
                *status_code == 409
            }
            _ => false,
        }
    }
}
