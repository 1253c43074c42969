//! brokerop-state: local cluster-state cache for the broker operator.
//!
//! Backed by [redb](https://docs.rs/redb), keeps the objects the status
//! reconciler reads (instances, stateful sets, replica sets, pods) and the
//! ones it writes (instance status, events). Something outside this crate
//! keeps the cache in sync with the orchestration platform.
//!
//! # Architecture
//!
//! All objects are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{namespace}/{instance}:{seq}`)
//! enable prefix scans per namespace and per instance.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements the `ResourceReader`, `StatusWriter` and `EventRecorder`
//! collaborator traits from `brokerop-core`.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
