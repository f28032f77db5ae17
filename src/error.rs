//! Error types for the volume manager
//!
//! Provides structured error types for all control plane components including
//! the volume facade, the managed-volume cache, node registry, and the
//! reconciliation worker.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Operation Context
    // =========================================================================
    /// Wrapper attaching the failing high-level operation to an underlying
    /// error, so callers can distinguish failure domains without parsing
    /// message text.
    #[error("unable to {operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Volume validation failed for {name}: {reason}")]
    VolumeValidation { name: String, reason: String },

    // =========================================================================
    // State Precondition Errors
    // =========================================================================
    #[error("invalid state to {operation}: {state}")]
    InvalidVolumeState { operation: &'static str, state: String },

    #[error("replica {name} is not marked failed")]
    ReplicaNotFailed { name: String },

    #[error("cannot create volume without an owner node: volume {name}")]
    MissingOwner { name: String },

    // =========================================================================
    // Not-Found Errors
    // =========================================================================
    #[error("cannot find volume {name}")]
    VolumeNotFound { name: String },

    #[error("cannot find replica {replica} of volume {volume}")]
    ReplicaNotFound { volume: String, replica: String },

    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Node already registered: {node_id}")]
    NodeAlreadyRegistered { node_id: String },

    #[error("no nodes available for volume placement")]
    NoNodesAvailable,

    #[error("cannot find snapshot {snapshot} of volume {volume}")]
    SnapshotNotFound { volume: String, snapshot: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("datastore error: {0}")]
    Datastore(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("cannot get backup {locator}: {reason}")]
    BackupLookup { locator: String, reason: String },

    // =========================================================================
    // Managed Volume Errors
    // =========================================================================
    #[error("volume {name} has no running engine")]
    EngineNotRunning { name: String },

    #[error("cannot remove last healthy replica {replica} of volume {volume}")]
    LastHealthyReplica { volume: String, replica: String },

    #[error("insufficient healthy replicas for volume {volume}: {healthy} of {required}")]
    InsufficientReplicas {
        volume: String,
        healthy: usize,
        required: usize,
    },

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Attach the failing high-level operation as context.
    pub fn operation(operation: &'static str, source: Error) -> Error {
        Error::Operation {
            operation,
            source: Box::new(source),
        }
    }

    /// The underlying error, with any operation context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Determine what action the reconciler should take for this error
    pub fn action(&self) -> ErrorAction {
        match self.root() {
            // Transient collaborator errors - retry with backoff
            Error::Datastore(_) | Error::Orchestrator(_) | Error::Engine(_) => {
                ErrorAction::RequeueWithBackoff
            }

            // Resource issues - medium retry
            Error::NoNodesAvailable | Error::InsufficientReplicas { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // Engine may still be coming up - short retry
            Error::EngineNotRunning { .. } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            // Validation and precondition errors - don't retry automatically
            Error::Configuration(_)
            | Error::InvalidRequest(_)
            | Error::CapacityParse(_)
            | Error::VolumeValidation { .. }
            | Error::InvalidVolumeState { .. }
            | Error::ReplicaNotFailed { .. }
            | Error::MissingOwner { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            Error::Datastore(_) | Error::Orchestrator(_) | Error::Engine(_)
        )
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::InsufficientReplicas {
            volume: "vol-1".into(),
            healthy: 1,
            required: 3,
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(60))
        );

        let err = Error::CapacityParse("10Xi".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::Datastore("connection reset".into());
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_operation_context_preserves_action() {
        let err = Error::operation(
            "attach volume",
            Error::InvalidVolumeState {
                operation: "attach",
                state: "healthy".into(),
            },
        );
        assert_eq!(err.action(), ErrorAction::NoRequeue);
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("unable to attach volume"));
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::Orchestrator("replica process start timed out".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let precondition = Error::ReplicaNotFailed {
            name: "replica-1".into(),
        };
        assert!(!precondition.is_retryable());
        assert!(!precondition.is_transient());
    }
}
