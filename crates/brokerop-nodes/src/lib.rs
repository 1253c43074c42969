//! brokerop-nodes: live membership of a broker cluster.
//!
//! Lists the cluster's members through the broker's administrative API
//! (`GET api/v5/nodes`) and translates the payload into typed
//! [`BrokerNode`](brokerop_core::BrokerNode) records.
//!
//! # Architecture
//!
//! ```text
//! fetch_nodes(&dyn Requester)
//!   ├── Requester::request(GET, api/v5/nodes)
//!   │     └── HttpRequester: hyper HTTP/1.1, basic auth, deadline
//!   ├── non-200        → NodeFetchError::Status
//!   ├── transport fail → NodeFetchError::Transport
//!   └── bad JSON       → NodeFetchError::Decode
//! ```
//!
//! The fetcher never retries. A failed fetch is reported to the caller,
//! which relies on the next reconciliation pass to try again.

pub mod error;
pub mod fetch;
pub mod requester;

pub use error::{NodeFetchError, RequestError};
pub use fetch::{NODES_PATH, NodeRecord, fetch_nodes};
pub use requester::{
    ApiResponse, DEFAULT_MAX_BODY_BYTES, HttpRequester, RequestFuture, Requester,
};
