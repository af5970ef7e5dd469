//! Error types for the etcd operator

use thiserror::Error;

use crate::status::OperationPhase;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic-concurrency retries exhausted
    #[error("Conflict retries exhausted updating {resource}")]
    Conflict { resource: String },

    /// Out-of-process command returned a non-zero exit
    #[error("exec cmd : {command}, cmd response : {output}")]
    CommandFailed { command: String, output: String },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Attempted to leave a terminal operation phase
    #[error("invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: OperationPhase,
        to: OperationPhase,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}

/// True if the kube error is an HTTP 404 from the API server
pub fn kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True if the kube error is an HTTP 409 optimistic-concurrency conflict
pub fn kube_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// True if the operator error wraps a 404 (resource deleted concurrently)
pub fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::Kube(e) if kube_not_found(e))
}
