//! Validated, cached, rate-limited GraphQL query execution.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::{DiagnosticSink, HarvestError};
use crate::models::Query;
use crate::transport::{Transport, TransportRequest};
use crate::utils::{CacheError, PersistentCache, RateLimiter};

/// A decoded value rejected by a check serde cannot express
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    /// Dotted path of the offending field, e.g. `data.fileMetadata`
    pub location: String,
    pub message: String,
}

impl ShapeMismatch {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Runs queries against the remote endpoint.
///
/// A cached digest is answered from disk with no network activity. A miss is
/// dispatched once inside a rate-limit slot, validated against the query's
/// shape and written back to the cache. Failures are dumped to the diagnostic
/// sink and returned as typed errors; nothing is retried at this layer.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    cache: Arc<PersistentCache>,
    limiter: Arc<RateLimiter>,
    diagnostics: DiagnosticSink,
}

impl QueryExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<PersistentCache>,
        limiter: Arc<RateLimiter>,
        diagnostics: DiagnosticSink,
    ) -> Self {
        Self {
            transport,
            cache,
            limiter,
            diagnostics,
        }
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    /// Execute `query` and return its validated result
    pub async fn execute<T>(&self, query: &Query<T>) -> Result<T, HarvestError>
    where
        T: DeserializeOwned + Serialize,
    {
        self.execute_checked(query, |_| Ok(())).await
    }

    /// Execute `query`, holding the decoded value to `check` before accepting it.
    ///
    /// A fresh response the check rejects is dumped and reported as a schema
    /// error, and is never cached. A cached record that fails the check is
    /// treated as a miss.
    pub async fn execute_checked<T, F>(
        &self,
        query: &Query<T>,
        check: F,
    ) -> Result<T, HarvestError>
    where
        T: DeserializeOwned + Serialize,
        F: Fn(&T) -> Result<(), ShapeMismatch>,
    {
        let digest = query.digest();

        if !query.is_refresh() {
            match self.cache.load::<T>(&digest) {
                Ok(value) => match check(&value) {
                    Ok(()) => {
                        tracing::debug!("Cache HIT for query: {}", digest);
                        return Ok(value);
                    }
                    Err(mismatch) => {
                        tracing::warn!("Discarding cached record {}: {}", digest, mismatch);
                    }
                },
                Err(CacheError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!("Cache MISS for query: {}", digest);

        let request = TransportRequest::post_json(self.transport.endpoint(), query.payload());

        let sent = {
            let _slot = self.limiter.acquire_slot().await;
            tracing::info!("Dispatching query {} to {}", digest, request.url);
            self.transport.send(&request).await
        };

        let response = match sent {
            Ok(response) => response,
            Err(failure) => {
                let message = failure.to_string();
                let artifact = self
                    .diagnostics
                    .transport_failure(&message, &request, None);
                tracing::warn!("Query {} failed: {}", digest, message);
                return Err(HarvestError::Transport {
                    message,
                    status: failure.status(),
                    artifact,
                });
            }
        };

        if !response.is_success() {
            let message = format!("HTTP status {} from {}", response.status, request.url);
            let artifact = self
                .diagnostics
                .transport_failure(&message, &request, Some(&response));
            tracing::warn!("Query {} failed: {}", digest, message);
            return Err(HarvestError::Transport {
                message,
                status: Some(response.status),
                artifact,
            });
        }

        let value: T = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(error) => {
                let artifact = self
                    .diagnostics
                    .schema_failure(&error, &request, &response.body);
                tracing::warn!("Query {} returned an unexpected shape: {}", digest, error);
                return Err(HarvestError::Schema {
                    message: error.to_string(),
                    artifact,
                });
            }
        };

        if let Err(mismatch) = check(&value) {
            let artifact = self.diagnostics.schema_rejection(
                &mismatch.location,
                &mismatch.message,
                &request,
                &response.body,
            );
            tracing::warn!("Query {} returned an unexpected shape: {}", digest, mismatch);
            return Err(HarvestError::Schema {
                message: mismatch.to_string(),
                artifact,
            });
        }

        self.cache.store(&digest, &value)?;
        Ok(value)
    }
}
