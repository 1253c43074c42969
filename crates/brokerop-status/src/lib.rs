//! brokerop-status: status reconciliation for broker clusters.
//!
//! Merges the desired spec, the owned workloads and pods recorded by the
//! orchestration platform, and the broker's self-reported membership into a
//! single [`InstanceStatus`](brokerop_core::InstanceStatus).
//!
//! # Components
//!
//! - **`correlate`**: binds live broker nodes to the pods running them
//! - **`revision`**: finds the workload carrying each tier's revision
//! - **`machine`**: pure status state machine (phase + conditions)
//! - **`reconciler`**: one reconciliation pass, one status write
//!
//! # Pass
//!
//! ```text
//! StatusReconciler::reconcile
//!   ├── resolve_workloads()      best effort, list errors logged
//!   ├── mirror replica counts
//!   ├── fetch_nodes()            optional; failure → warning event
//!   │   └── correlate(nodes, pods)
//!   ├── next_status()            pure
//!   └── update_status()          the only fatal step
//! ```

pub mod correlate;
pub mod error;
pub mod machine;
pub mod reconciler;
pub mod revision;

pub use correlate::correlate;
pub use error::ReconcileError;
pub use machine::next_status;
pub use reconciler::StatusReconciler;
pub use revision::{Lookup, ResolvedWorkloads, TierWorkloads, resolve_workloads};
