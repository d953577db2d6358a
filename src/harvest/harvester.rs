//! One-stop wiring of the shared harvesting components.

use std::sync::Arc;

use super::{DiagnosticSink, HarvestError, QueryExecutor};
use crate::config::Config;
use crate::transport::{HttpTransport, Transport};
use crate::utils::{BoundedDownloader, PersistentCache, RateLimiter};

/// Owns the transport, cache, rate limiter and diagnostics sink for one run.
///
/// Every executor handed out shares the same limiter, so all queries made
/// through one `Harvester` respect a single global interval.
#[derive(Debug, Clone)]
pub struct Harvester {
    executor: QueryExecutor,
    downloader: BoundedDownloader,
}

impl Harvester {
    /// Build the production stack (reqwest transport, on-disk cache) from `config`
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let transport = HttpTransport::from_config(&config.http)
            .map_err(|e| HarvestError::Setup(e.to_string()))?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Build around an existing transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Result<Self, HarvestError> {
        let cache = PersistentCache::from_config(&config.cache)?;
        let limiter = RateLimiter::new(config.rate_limits.interval());
        let diagnostics = DiagnosticSink::new(&config.diagnostics.path);

        tracing::debug!(
            "Harvester ready: endpoint={}, interval={:?}, max_downloads={}",
            transport.endpoint(),
            limiter.interval(),
            config.downloads.max_concurrent
        );

        Ok(Self {
            executor: QueryExecutor::new(
                Arc::clone(&transport),
                Arc::new(cache),
                Arc::new(limiter),
                diagnostics,
            ),
            downloader: BoundedDownloader::from_config(transport, &config.downloads),
        })
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn downloader(&self) -> &BoundedDownloader {
        &self.downloader
    }

    pub fn cache(&self) -> &PersistentCache {
        self.executor.cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Query;
    use crate::transport::MockTransport;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.cache.directory = Some(dir.path().join("cache"));
        config.diagnostics.path = dir.path().join("error.txt");
        config.rate_limits.interval_seconds = 0.05;
        config.downloads.max_concurrent = 3;
        config
    }

    #[test]
    fn test_from_config_creates_cache_directory() {
        let dir = TempDir::new().unwrap();
        let harvester = Harvester::from_config(&config(&dir)).unwrap();

        assert!(dir.path().join("cache").join("graphql").is_dir());
        assert_eq!(harvester.cache().dir(), dir.path().join("cache/graphql"));
        assert_eq!(
            harvester.executor().limiter().interval(),
            Duration::from_millis(50)
        );
        assert_eq!(harvester.downloader().max_concurrent(), 3);
        assert_eq!(
            harvester.executor().diagnostics().path(),
            dir.path().join("error.txt")
        );
    }

    #[tokio::test]
    async fn test_cloned_harvesters_share_one_limiter() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::with_body(r#"{"data": {}}"#));
        let harvester = Harvester::with_transport(transport.clone(), &config(&dir)).unwrap();
        let other = harvester.clone();

        let a: Query<serde_json::Value> = Query::new("query { a }");
        let b: Query<serde_json::Value> = Query::new("query { b }");
        let (ra, rb) = tokio::join!(
            harvester.executor().execute(&a),
            other.executor().execute(&b)
        );
        ra.unwrap();
        rb.unwrap();

        let mut times = transport.dispatch_times();
        times.sort();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] + Duration::from_millis(2) >= Duration::from_millis(50));
    }
}
