//! Error types for the brokerop state store.

use brokerop_core::ClusterError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict on {key}: stored version {stored}, caller had {seen}")]
    Conflict { key: String, stored: u64, seen: u64 },
}

impl StateError {
    /// Convert a failed list into the collaborator error for `kind`.
    pub fn into_list_error(self, kind: &'static str) -> ClusterError {
        ClusterError::List {
            kind,
            reason: self.to_string(),
        }
    }
}

impl From<StateError> for ClusterError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(key) => ClusterError::NotFound(key),
            StateError::Conflict { key, stored, seen } => {
                ClusterError::Conflict { key, stored, seen }
            }
            other => ClusterError::Write(other.to_string()),
        }
    }
}
