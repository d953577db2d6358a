//! # PDC Harvest
//!
//! A harvesting layer for bulk-collecting paginated, rate-limited GraphQL
//! results from the Proteomic Data Commons, persisting them durably and
//! fanning out across many studies concurrently.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Queries, digests and download tasks
//! - [`transport`]: The network seam (reqwest-backed and mock transports)
//! - [`harvest`]: Query execution, pagination and concurrent fan-out
//! - [`utils`]: Cache, rate limiter, downloader and retry helpers
//! - [`config`]: Configuration management
//!
//! ## Example
//!
//! ```rust,no_run
//! use pdc_harvest::config::Config;
//! use pdc_harvest::harvest::{fan_out, Harvester};
//! use pdc_harvest::models::Query;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), pdc_harvest::harvest::HarvestError> {
//! let harvester = Harvester::from_config(&Config::default())?;
//! let executor = harvester.executor();
//!
//! let studies = ["PDC000109", "PDC000111"];
//! let results = fan_out(studies, |id| async move {
//!     let query: Query<serde_json::Value> =
//!         Query::new(format!("query {{ study(pdc_study_id: \"{}\") {{ study_name }} }}", id));
//!     executor.execute(&query).await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod harvest;
pub mod models;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use harvest::{HarvestError, Harvester, QueryExecutor};
pub use models::{GraphQlResponse, Query};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
