//! redb table definitions for the brokerop state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized objects).

use redb::TableDefinition;

/// Instances keyed by `{namespace}/{name}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Stateful sets keyed by `{namespace}/{name}`.
pub const STATEFUL_SETS: TableDefinition<&str, &[u8]> = TableDefinition::new("stateful_sets");

/// Replica sets keyed by `{namespace}/{name}`.
pub const REPLICA_SETS: TableDefinition<&str, &[u8]> = TableDefinition::new("replica_sets");

/// Pods keyed by `{namespace}/{name}`.
pub const PODS: TableDefinition<&str, &[u8]> = TableDefinition::new("pods");

/// Events keyed by `{namespace}/{instance}:{timestamp}:{seq}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
