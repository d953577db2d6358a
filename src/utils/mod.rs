//! Building blocks shared by the harvesting layer.
//!
//! - [`PersistentCache`]: durable, content-addressed store of query results
//! - [`RateLimiter`]: global minimum interval between dispatched requests
//! - [`BoundedDownloader`]: streams files to disk under a concurrency ceiling
//! - [`HttpClient`]: shared reqwest client built from configuration
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff for transient transport failures
//!
//! # Rate Limiting
//!
//! ```rust,no_run
//! use pdc_harvest::utils::RateLimiter;
//! use std::time::Duration;
//!
//! # async fn dispatch() {}
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::new(Duration::from_millis(500));
//! limiter.throttle(dispatch()).await;
//! # }
//! ```
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use pdc_harvest::transport::TransportFailure;
//! use pdc_harvest::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, TransportFailure> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), TransportFailure> {
//! let config = RetryConfig::with_retries(3);
//! let result = with_retry(config, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod download;
mod http;
mod rate_limit;
mod retry;

pub use cache::{CacheError, CacheStats, PersistentCache, QUERY_NAMESPACE};
pub use download::{BoundedDownloader, DownloadError};
pub use http::HttpClient;
pub use rate_limit::{RateLimitSlot, RateLimiter};
pub use retry::{with_retry, RetryConfig, TransientError};
