//! reqwest-backed transport.

use async_trait::async_trait;
use futures_util::StreamExt;

use super::{ByteStream, Transport, TransportFailure, TransportRequest, TransportResponse};
use crate::config::HttpConfig;
use crate::utils::{with_retry, HttpClient, RetryConfig, TransientError};

/// Production transport talking to a real GraphQL endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    endpoint: String,
    retry: RetryConfig,
}

impl HttpTransport {
    /// Create a transport from the HTTP configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, TransportFailure> {
        Ok(Self {
            client: HttpClient::from_config(config)?,
            endpoint: config.endpoint.clone(),
            retry: RetryConfig::with_retries(config.retries),
        })
    }

    /// Create with a custom HTTP client (for testing)
    pub fn with_client(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportFailure> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportFailure::InvalidRequest(e.to_string()))?;

        let mut builder = self
            .client
            .client()
            .request(method, &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        // Retryable statuses go through the retry loop as failures.
        if TransientError::from_status(status).is_some() {
            return Err(TransportFailure::Status { status, body });
        }

        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFailure> {
        tracing::debug!("{} {}", request.method, request.url);

        match with_retry(self.retry, || self.send_once(request)).await {
            // An exhausted retryable status is still a response the caller should see.
            Err(TransportFailure::Status { status, body }) => {
                Ok(TransportResponse { status, body })
            }
            other => other,
        }
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, TransportFailure> {
        let client = self.client.client();

        let response = with_retry(self.retry, || async {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransportFailure::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(response)
        })
        .await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportFailure::from))
            .boxed())
    }
}
