//! Request capability bound to one broker instance's administrative API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::{Engine, prelude::BASE64_STANDARD};
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, Limited, LengthLimitError};
use tracing::debug;

use crate::error::RequestError;

/// Boxed future returned by [`Requester::request`].
pub type RequestFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApiResponse, RequestError>> + Send + 'a>>;

/// Status and full body of an administrative API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issues requests against one instance's administrative API.
///
/// Injected into the reconciler so tests can script responses.
pub trait Requester: Send + Sync {
    /// Send `method` to `path` (relative to the API root) with an optional
    /// JSON body and return the complete response.
    fn request<'a>(
        &'a self,
        method: Method,
        path: &'a str,
        body: Option<Bytes>,
    ) -> RequestFuture<'a>;

    /// `host:port` this requester talks to, for diagnostics.
    fn address(&self) -> &str;
}

/// Largest response body the requester will buffer.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// HTTP/1.1 requester with basic authentication, a per-call deadline and a
/// response size cap.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    address: String,
    authorization: Option<String>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpRequester {
    /// Create a requester for `address` (`host:port`).
    pub fn new(address: &str, timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            authorization: None,
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Reject responses whose body exceeds `bytes`.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Authenticate every request with HTTP basic auth.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let token = BASE64_STANDARD.encode(format!("{username}:{password}"));
        self.authorization = Some(format!("Basic {token}"));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<ApiResponse, RequestError> {
        let uri = format!("/{}", path.trim_start_matches('/'));

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| RequestError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        // Drive the connection in the background.
        let address = self.address.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %address, "api connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(&uri)
            .header(HOST, &self.address)
            .header(USER_AGENT, "brokerop/0.1")
            .header(ACCEPT, "application/json");
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| RequestError::Build(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;
        let status = resp.status();
        let limit = self.max_body_bytes;
        let body = Limited::new(resp.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    RequestError::BodyTooLarge(limit)
                } else {
                    RequestError::Transport(e.to_string())
                }
            })?
            .to_bytes();

        debug!(%uri, %status, bytes = body.len(), address = %self.address, "api call complete");
        Ok(ApiResponse { status, body })
    }
}

impl Requester for HttpRequester {
    fn request<'a>(
        &'a self,
        method: Method,
        path: &'a str,
        body: Option<Bytes>,
    ) -> RequestFuture<'a> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.send(method, path, body)).await {
                Ok(result) => result,
                Err(_) => Err(RequestError::Timeout(self.timeout)),
            }
        })
    }

    fn address(&self) -> &str {
        &self.address
    }
}
