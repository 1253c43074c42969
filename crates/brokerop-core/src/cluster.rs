//! Collaborator interfaces onto the orchestration platform.
//!
//! The status reconciler never talks to the platform directly. It reads
//! owned workloads and pods through [`ResourceReader`], writes the status
//! sub-resource through [`StatusWriter`] and emits events through
//! [`EventRecorder`]. `brokerop-state` provides a redb-backed
//! implementation of all three.

use thiserror::Error;

use crate::types::{EventType, Instance, Labels, Pod, Workload};

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failures reported by a platform collaborator.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("list {kind} failed: {reason}")]
    List { kind: &'static str, reason: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("conflict writing {key}: stored version {stored}, caller had {seen}")]
    Conflict { key: String, stored: u64, seen: u64 },

    #[error("write failed: {0}")]
    Write(String),
}

/// Read access to the local cluster-state cache.
///
/// Every selector entry must be present on a returned object. An empty
/// result is not an error.
pub trait ResourceReader: Send + Sync {
    fn list_stateful_sets(&self, namespace: &str, selector: &Labels)
    -> ClusterResult<Vec<Workload>>;

    fn list_replica_sets(&self, namespace: &str, selector: &Labels)
    -> ClusterResult<Vec<Workload>>;

    fn list_pods(&self, namespace: &str, selector: &Labels) -> ClusterResult<Vec<Pod>>;
}

/// Write access to an instance's status sub-resource.
pub trait StatusWriter: Send + Sync {
    /// Persist `instance.status`. Fails with [`ClusterError::Conflict`] when
    /// the stored `resource_version` differs from the caller's.
    fn update_status(&self, instance: &Instance) -> ClusterResult<()>;
}

/// Fire-and-forget event sink.
pub trait EventRecorder: Send + Sync {
    fn record(&self, instance: &Instance, event_type: EventType, reason: &str, message: &str);
}
