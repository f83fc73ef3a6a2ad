//! Error types for the mediation pipeline.
//!
//! Expected outcomes (a lost race, a missing capability) are variants the
//! caller matches on. Only [`MediationError::Storage`] signals that the
//! backing store itself misbehaved.

use stockgate_db::{ActionId, ActionStatus, DbError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediationError>;

#[derive(Error, Debug)]
pub enum MediationError {
    /// The requester's role lacks the capability the operation needs.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Malformed input or a precondition on the target record.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The catalog holds more than one entry the matcher cannot tell apart.
    #[error("Ambiguous catalog for '{query}': {} entries match ({})", .candidates.len(), .candidates.join(", "))]
    AmbiguousCatalog {
        query: String,
        candidates: Vec<String>,
    },

    /// The ledger row was not in a state that allows the requested edge.
    #[error("Action {action_id} is {from}; cannot move to {attempted}")]
    InvalidTransition {
        action_id: ActionId,
        from: ActionStatus,
        attempted: ActionStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Executor failure. Captured into the ledger row as `FAILED`.
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Model call failed: {0}")]
    UpstreamModel(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl MediationError {
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Status code an HTTP boundary would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Authorization(_) => 403,
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::UpstreamModel(_) => 502,
            Self::AmbiguousCatalog { .. } | Self::Execution(_) | Self::Storage(_) => 500,
        }
    }

    /// Whether a client should treat this as its own mistake.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

impl From<DbError> for MediationError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => Self::NotFound(msg),
            DbError::Constraint(msg) => Self::Validation(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MediationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("invalid JSON: {}", err))
    }
}
