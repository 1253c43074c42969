//! Reconcile error types.

use brokerop_core::ClusterError;
use thiserror::Error;

/// Failure of a reconciliation pass. Only persisting the status can fail a
/// pass; every other problem degrades the pass and is reported instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to update status of {instance}: {source}")]
    PersistStatus {
        instance: String,
        #[source]
        source: ClusterError,
    },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
