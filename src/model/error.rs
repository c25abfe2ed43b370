// Error taxonomy shared by the registry, scheduler, lifecycle manager and prober.

use std::fmt;

use super::hardware::Dimension;

/// A malformed or out-of-bounds specification field. Rejects the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Node-wide serialized operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Removal,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install => write!(f, "installation"),
            Operation::Removal => write!(f, "removal"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Duplicate name, port collision, architecture mismatch and similar.
    #[error("{0}")]
    Conflict(String),

    #[error("insufficient {dimension} on this node: requested {requested}, available {available}")]
    ResourceExhausted {
        dimension: Dimension,
        requested: f64,
        available: f64,
    },

    #[error("application {0} not found")]
    NotFound(String),

    #[error("another {0} operation in progress")]
    Busy(Operation),

    #[error("peer {peer} unreachable: {reason}")]
    UnreachablePeer { peer: String, reason: String },

    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl FleetError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        FleetError::Conflict(msg.into())
    }

    /// Short machine-readable kind, used in API payloads and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FleetError::Validation(_) => "validation",
            FleetError::Conflict(_) => "conflict",
            FleetError::ResourceExhausted { .. } => "resource_exhausted",
            FleetError::NotFound(_) => "not_found",
            FleetError::Busy(_) => "busy",
            FleetError::UnreachablePeer { .. } => "unreachable_peer",
            FleetError::Signature(_) => "signature",
            FleetError::Infrastructure(_) => "infrastructure",
        }
    }

    /// True for failures that happen before any mutation and are safe to retry later.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, FleetError::Infrastructure(_))
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
