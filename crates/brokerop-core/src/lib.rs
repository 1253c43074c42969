//! brokerop-core: shared types for the broker cluster operator.
//!
//! Holds the instance model (desired spec + observed status), the owned
//! workload and pod records read from the orchestration platform, the label
//! conventions that tie them together, and the collaborator traits the
//! status reconciler consumes.

pub mod cluster;
pub mod config;
pub mod labels;
pub mod types;

pub use cluster::{ClusterError, ClusterResult, EventRecorder, ResourceReader, StatusWriter};
pub use config::OperatorConfig;
pub use types::*;
