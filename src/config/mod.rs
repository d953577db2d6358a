//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `PDC_HARVEST_*` environment variables (`__` separates section and key, e.g.
//! `PDC_HARVEST_RATE_LIMITS__INTERVAL_SECONDS=1.0`).

mod file_config;

pub use file_config::{write_default_config, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "PDC_HARVEST";

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "pdc-harvest.toml";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint and transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Query cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Where failure diagnostics are written
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// GraphQL endpoint every query is POSTed to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// How many times a transient transport failure is retried
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_endpoint() -> String {
    "https://proteomic.datacommons.cancer.gov/graphql".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between dispatched queries, in seconds
    #[serde(default = "default_interval")]
    pub interval_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

impl RateLimitConfig {
    /// Interval as a `Duration`; negative or non-finite values clamp to zero
    pub fn interval(&self) -> Duration {
        if self.interval_seconds.is_finite() && self.interval_seconds > 0.0 {
            Duration::from_secs_f64(self.interval_seconds)
        } else {
            Duration::ZERO
        }
    }
}

fn default_interval() -> f64 {
    0.5
}

/// Download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum number of transfers in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Default directory downloads are written to
    #[serde(default = "default_download_dir")]
    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            directory: default_download_dir(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

/// Query cache configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; defaults to the per-user cache directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl CacheConfig {
    /// Resolved cache directory
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_cache_dir)
    }
}

/// Default cache directory (`<user cache dir>/pdc-harvest`)
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
}

/// Diagnostics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// File overwritten with the details of the most recent failure
    #[serde(default = "default_diagnostics_path")]
    pub path: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            path: default_diagnostics_path(),
        }
    }
}

fn default_diagnostics_path() -> PathBuf {
    PathBuf::from("error.txt")
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per log line instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

/// Find a config file in the working directory or the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rate_limits.interval(), Duration::from_millis(500));
        assert_eq!(config.downloads.max_concurrent, 5);
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.http.retries, 3);
        assert_eq!(config.diagnostics.path, PathBuf::from("error.txt"));
    }

    #[test]
    fn test_interval_clamps_negative() {
        let limits = RateLimitConfig {
            interval_seconds: -1.0,
        };
        assert_eq!(limits.interval(), Duration::ZERO);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pdc-harvest.toml");

        let toml_content = r#"
[http]
endpoint = "http://localhost:9999/graphql"
retries = 5

[rate_limits]
interval_seconds = 0.25

[downloads]
max_concurrent = 2

[cache]
directory = "/tmp/pdc-cache"

[logging]
json = true
"#;

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.http.endpoint, "http://localhost:9999/graphql");
        assert_eq!(config.http.retries, 5);
        assert_eq!(config.http.timeout_seconds, 10);
        assert_eq!(config.rate_limits.interval(), Duration::from_millis(250));
        assert_eq!(config.downloads.max_concurrent, 2);
        assert_eq!(
            config.cache.resolved_directory(),
            PathBuf::from("/tmp/pdc-cache")
        );
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/pdc-harvest.toml")));
        assert!(result.is_err());
    }
}
