//! HTTP fetch tests against a loopback server.
//!
//! A bare tokio listener plays the broker's administrative API so the
//! hyper client path (connect, handshake, auth header, body collection,
//! deadline) is exercised end to end.

use std::time::Duration;

use brokerop_core::NodeRole;
use brokerop_nodes::{HttpRequester, NodeFetchError, RequestError, fetch_nodes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one connection with `status_line` and `body`; hand back the raw request.
async fn serve_once(
    status_line: &'static str,
    body: impl Into<String>,
) -> (String, oneshot::Receiver<String>) {
    let body: String = body.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let mut request = Vec::new();
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        // The client may hang up early on an oversized body.
        let _ = socket.write_all(response.as_bytes()).await;
        socket.shutdown().await.ok();
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
    });

    (address, rx)
}

#[tokio::test]
async fn fetches_nodes_over_http() {
    let (address, request) = serve_once(
        "200 OK",
        r#"[{"node":"emqx@broker-0.internal:4370","role":"core","node_status":"running"}]"#,
    )
    .await;

    let requester =
        HttpRequester::new(&address, Duration::from_secs(5)).with_basic_auth("admin", "public");
    let nodes = fetch_nodes(&requester).await.unwrap();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node, "emqx@broker-0.internal:4370");
    assert_eq!(nodes[0].role, NodeRole::Core);

    let raw = request.await.unwrap().to_lowercase();
    assert!(raw.starts_with("get /api/v5/nodes http/1.1"));
    assert!(raw.contains("authorization: basic ywrtaw46chvibglj"));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let (address, _request) = serve_once("503 Service Unavailable", r#"{"code":"NOT_READY"}"#).await;

    let requester = HttpRequester::new(&address, Duration::from_secs(5));
    let err = fetch_nodes(&requester).await.unwrap_err();

    match err {
        NodeFetchError::Status { status, body, .. } => {
            assert_eq!(status.as_u16(), 503);
            assert!(body.contains("NOT_READY"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    // Bind then drop to obtain a port nothing listens on.
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let requester = HttpRequester::new(&address, Duration::from_secs(5));
    let err = fetch_nodes(&requester).await.unwrap_err();

    assert!(matches!(
        err,
        NodeFetchError::Transport {
            source: RequestError::Connect { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn silent_server_hits_deadline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        // Accept and hold the connection without answering.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let requester = HttpRequester::new(&address, Duration::from_millis(200));
    let err = fetch_nodes(&requester).await.unwrap_err();

    assert!(matches!(
        err,
        NodeFetchError::Transport {
            source: RequestError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let body = format!("[{}]", vec![r#"{"node":"emqx@a","role":"core"}"#; 200].join(","));
    let (address, _request) = serve_once("200 OK", body).await;

    let requester = HttpRequester::new(&address, Duration::from_secs(5)).with_max_body_bytes(1024);
    let err = fetch_nodes(&requester).await.unwrap_err();

    assert!(matches!(
        err,
        NodeFetchError::Transport {
            source: RequestError::BodyTooLarge(1024),
            ..
        }
    ));
}
