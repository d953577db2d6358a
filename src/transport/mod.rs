//! The network seam of the harvesting layer.
//!
//! Everything that touches the network goes through the [`Transport`] trait:
//! GraphQL POSTs via [`Transport::send`] and file downloads via
//! [`Transport::open_stream`]. [`HttpTransport`] is the reqwest-backed
//! implementation used in production; [`MockTransport`] scripts responses and
//! counts calls for tests.

mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::fmt;

/// A chunked response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportFailure>>;

/// A fully described outgoing request, kept so failures can be dumped verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportRequest {
    /// A JSON POST to `url`
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )],
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response that made it back from the server, successful or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures that prevented a response from being received
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    /// Could not connect or the connection dropped
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success status
    #[error("HTTP status {status}")]
    Status { status: u16, body: String },

    /// The request could not be built or sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportFailure {
    /// Status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportFailure::Timeout(err.to_string())
        } else if err.is_builder() {
            TransportFailure::InvalidRequest(err.to_string())
        } else {
            TransportFailure::Network(err.to_string())
        }
    }
}

/// Network access used by the executor and the downloader.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// URL GraphQL queries are POSTed to
    fn endpoint(&self) -> &str;

    /// Send one request and return whatever the server answered.
    ///
    /// Non-success statuses are returned as responses, not errors; only failures
    /// that left no response (after the transport's own retries) are `Err`.
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFailure>;

    /// Start a GET for `url` and return its body as a stream of chunks.
    ///
    /// A non-success status is reported as [`TransportFailure::Status`].
    async fn open_stream(&self, url: &str) -> Result<ByteStream, TransportFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_json_request() {
        let request = TransportRequest::post_json("http://x/graphql", r#"{"query":"q"}"#);
        assert_eq!(request.method, "POST");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_response_success_range() {
        assert!(TransportResponse::ok("{}").is_success());
        assert!(TransportResponse::new(204, "").is_success());
        assert!(!TransportResponse::new(302, "").is_success());
        assert!(!TransportResponse::new(500, "").is_success());
    }

    #[test]
    fn test_failure_status() {
        let failure = TransportFailure::Status {
            status: 404,
            body: "missing".to_string(),
        };
        assert_eq!(failure.status(), Some(404));
        assert_eq!(TransportFailure::Network("x".into()).status(), None);
    }
}
