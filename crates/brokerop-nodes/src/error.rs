//! Error types for the node status fetcher.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// A single administrative API call failed below the HTTP status level.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    Build(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// Listing the live cluster members failed.
#[derive(Debug, Error)]
pub enum NodeFetchError {
    #[error("failed to get API {path}: {source}")]
    Transport {
        path: &'static str,
        #[source]
        source: RequestError,
    },

    #[error("failed to get API {path}, status: {status}, body: {body}")]
    Status {
        path: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("failed to unmarshal node statuses from {path}: {source}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
