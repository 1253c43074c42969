//! `GET api/v5/nodes`: list live broker cluster members.

use http::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use brokerop_core::{BrokerNode, NodeRole};

use crate::error::NodeFetchError;
use crate::requester::Requester;

/// Administrative endpoint listing cluster members.
pub const NODES_PATH: &str = "api/v5/nodes";

/// Longest response body kept in a [`NodeFetchError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// One element of the `api/v5/nodes` payload, as the broker sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRecord {
    pub node: String,
    pub role: String,
    #[serde(default)]
    pub node_status: Option<String>,
    #[serde(default)]
    pub otp_release: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub connections: Option<u64>,
}

impl NodeRecord {
    /// Translate into an uncorrelated status record.
    pub fn into_node(self) -> BrokerNode {
        let role = match self.role.as_str() {
            "core" => NodeRole::Core,
            "replicant" => NodeRole::Replicant,
            _ => NodeRole::Unknown,
        };
        BrokerNode {
            node: self.node,
            role,
            node_status: self.node_status,
            otp_release: self.otp_release,
            version: self.version,
            edition: self.edition,
            uptime: self.uptime,
            connections: self.connections,
            pod_uid: None,
            controller_uid: None,
        }
    }
}

/// Fetch the live member list through `requester`. Never retries.
pub async fn fetch_nodes(requester: &dyn Requester) -> Result<Vec<BrokerNode>, NodeFetchError> {
    let resp = requester
        .request(Method::GET, NODES_PATH, None)
        .await
        .map_err(|source| NodeFetchError::Transport {
            path: NODES_PATH,
            source,
        })?;

    if resp.status != StatusCode::OK {
        let body = String::from_utf8_lossy(&resp.body);
        return Err(NodeFetchError::Status {
            path: NODES_PATH,
            status: resp.status,
            body: truncate(&body, MAX_ERROR_BODY),
        });
    }

    let records: Vec<NodeRecord> =
        serde_json::from_slice(&resp.body).map_err(|source| NodeFetchError::Decode {
            path: NODES_PATH,
            source,
        })?;

    debug!(
        address = %requester.address(),
        count = records.len(),
        "fetched broker node statuses"
    );
    Ok(records.into_iter().map(NodeRecord::into_node).collect())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::requester::{ApiResponse, RequestFuture};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a fixed response and records requested paths.
    struct StubRequester {
        reply: Result<(StatusCode, &'static str), ()>,
        calls: Mutex<Vec<(Method, String)>>,
    }

    impl StubRequester {
        fn ok(status: StatusCode, body: &'static str) -> Self {
            Self {
                reply: Ok((status, body)),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn timing_out() -> Self {
            Self {
                reply: Err(()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Requester for StubRequester {
        fn request<'a>(
            &'a self,
            method: Method,
            path: &'a str,
            _body: Option<Bytes>,
        ) -> RequestFuture<'a> {
            self.calls.lock().unwrap().push((method, path.to_string()));
            let reply = self.reply;
            Box::pin(async move {
                match reply {
                    Ok((status, body)) => Ok(ApiResponse {
                        status,
                        body: Bytes::from_static(body.as_bytes()),
                    }),
                    Err(()) => Err(RequestError::Timeout(Duration::from_secs(1))),
                }
            })
        }

        fn address(&self) -> &str {
            "stub:18083"
        }
    }

    #[tokio::test]
    async fn parses_node_list() {
        let stub = StubRequester::ok(
            StatusCode::OK,
            r#"[
                {"node":"emqx@broker-0.internal:4370","role":"core","node_status":"running","version":"5.0.4","uptime":1200},
                {"node":"emqx@10.0.0.5","role":"replicant"}
            ]"#,
        );

        let nodes = fetch_nodes(&stub).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].role, NodeRole::Core);
        assert_eq!(nodes[0].version.as_deref(), Some("5.0.4"));
        assert_eq!(nodes[0].uptime, Some(1200));
        assert_eq!(nodes[1].role, NodeRole::Replicant);
        assert!(nodes.iter().all(|n| n.pod_uid.is_none()));

        let calls = stub.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(Method::GET, NODES_PATH.to_string())]);
    }

    #[tokio::test]
    async fn unknown_role_kept_as_unknown() {
        let stub = StubRequester::ok(StatusCode::OK, r#"[{"node":"x@y","role":"observer"}]"#);
        let nodes = fetch_nodes(&stub).await.unwrap();
        assert_eq!(nodes[0].role, NodeRole::Unknown);
    }

    #[tokio::test]
    async fn non_200_is_status_error() {
        let stub = StubRequester::ok(StatusCode::UNAUTHORIZED, r#"{"code":"BAD_API_KEY"}"#);
        let err = fetch_nodes(&stub).await.unwrap_err();
        match err {
            NodeFetchError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("BAD_API_KEY"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn other_success_codes_are_rejected() {
        let stub = StubRequester::ok(StatusCode::NO_CONTENT, "");
        assert!(matches!(
            fetch_nodes(&stub).await,
            Err(NodeFetchError::Status { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_payload_is_decode_error() {
        let stub = StubRequester::ok(StatusCode::OK, r#"{"nodes":[]}"#);
        assert!(matches!(
            fetch_nodes(&stub).await,
            Err(NodeFetchError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn transport_failure_is_wrapped() {
        let stub = StubRequester::timing_out();
        let err = fetch_nodes(&stub).await.unwrap_err();
        assert!(matches!(err, NodeFetchError::Transport { .. }));
        assert!(err.to_string().contains(NODES_PATH));
    }

    #[tokio::test]
    async fn empty_list_is_ok() {
        let stub = StubRequester::ok(StatusCode::OK, "[]");
        assert!(fetch_nodes(&stub).await.unwrap().is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("héllo", 2), "h...");
    }
}
