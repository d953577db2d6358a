//! Durable, content-addressed cache for validated query results.
//!
//! # Cache Structure
//!
//! ```text
//! ~/.cache/pdc-harvest/
//!   graphql/
//!     <digest>.json
//! ```
//!
//! Each record holds one serialized result. Records are written to a
//! temporary file in the same directory and renamed into place, so a reader
//! sees either no record or a complete one. Records never expire; the only
//! way to drop them is [`PersistentCache::clear_all`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::CacheConfig;
use crate::models::Digest;

/// Namespace used for GraphQL query results
pub const QUERY_NAMESPACE: &str = "graphql";

const RECORD_EXTENSION: &str = "json";

/// Errors raised by cache storage
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No record exists for the digest
    #[error("No cache record for {0}")]
    NotFound(Digest),

    /// The cache directory or a record could not be read or written
    #[error("Cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record exists but does not decode into the requested shape
    #[error("Corrupt cache record {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A value could not be serialized for storage
    #[error("Failed to serialize cache record for {digest}: {message}")]
    Serialize { digest: Digest, message: String },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Permanent key/value memo of query results, one file per digest
#[derive(Debug, Clone)]
pub struct PersistentCache {
    /// Namespace directory holding the records
    dir: PathBuf,
}

impl PersistentCache {
    /// Open (creating if needed) the namespace `namespace` under `base_dir`
    pub fn open(base_dir: impl AsRef<Path>, namespace: &str) -> Result<Self, CacheError> {
        let dir = base_dir.as_ref().join(namespace);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tracing::debug!("Cache opened at: {}", dir.display());
        Ok(Self { dir })
    }

    /// Open the query namespace in the configured (or default) cache directory
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::open(config.resolved_directory(), QUERY_NAMESPACE)
    }

    /// Get the namespace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, digest: &Digest) -> PathBuf {
        self.dir
            .join(format!("{}.{}", digest.as_str(), RECORD_EXTENSION))
    }

    /// Whether a record exists for `digest`
    pub fn exists(&self, digest: &Digest) -> bool {
        self.record_path(digest).is_file()
    }

    /// Read and decode the record for `digest`
    pub fn load<T: DeserializeOwned>(&self, digest: &Digest) -> Result<T, CacheError> {
        let path = self.record_path(digest);

        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound(digest.clone()))
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        serde_json::from_slice(&content).map_err(|e| CacheError::Corrupt {
            path,
            message: e.to_string(),
        })
    }

    /// Serialize `value` and atomically replace the record for `digest`
    pub fn store<T: Serialize>(&self, digest: &Digest, value: &T) -> Result<(), CacheError> {
        let content = serde_json::to_vec(value).map_err(|e| CacheError::Serialize {
            digest: digest.clone(),
            message: e.to_string(),
        })?;

        let path = self.record_path(digest);

        let mut temp = tempfile::Builder::new()
            .prefix(".pending-")
            .tempfile_in(&self.dir)
            .map_err(|e| CacheError::io(&self.dir, e))?;
        temp.write_all(&content)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| CacheError::io(temp.path(), e))?;
        temp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        tracing::debug!("Cached query result: {}", digest);
        Ok(())
    }

    /// Remove every record in this namespace; returns how many were removed
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;

        for path in self.records()? {
            fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }

        tracing::info!("Cache cleared ({} records)", removed);
        Ok(removed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats {
            cache_dir: self.dir.clone(),
            entries: 0,
            size_bytes: 0,
        };

        for path in self.records()? {
            stats.entries += 1;
            stats.size_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }

        Ok(stats)
    }

    /// Paths of all committed records
    fn records(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            let is_record = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION);
            if is_record {
                records.push(path);
            }
        }
        Ok(records)
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Namespace directory
    pub cache_dir: PathBuf,

    /// Number of cached records
    pub entries: usize,

    /// Total size of all records
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Studies {
        ids: Vec<String>,
    }

    fn studies() -> Studies {
        Studies {
            ids: vec!["PDC000109".to_string(), "PDC000111".to_string()],
        }
    }

    #[test]
    fn test_store_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
        let digest = Digest::of("query { studyCatalog { pdc_study_id } }");

        assert!(!cache.exists(&digest));
        cache.store(&digest, &studies()).unwrap();
        assert!(cache.exists(&digest));

        let loaded: Studies = cache.load(&digest).unwrap();
        assert_eq!(loaded, studies());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let digest = Digest::of("query { a }");

        {
            let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
            cache.store(&digest, &studies()).unwrap();
        }

        let reopened = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
        let loaded: Studies = reopened.load(&digest).unwrap();
        assert_eq!(loaded, studies());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();

        let result: Result<Studies, _> = cache.load(&Digest::of("missing"));
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_load_wrong_shape_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
        let digest = Digest::of("query { a }");
        cache.store(&digest, &vec![1, 2, 3]).unwrap();

        let result: Result<Studies, _> = cache.load(&digest);
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_store_overwrites_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
        let digest = Digest::of("query { a }");

        cache.store(&digest, &vec![1]).unwrap();
        cache.store(&digest, &vec![2]).unwrap();

        let loaded: Vec<i32> = cache.load(&digest).unwrap();
        assert_eq!(loaded, vec![2]);
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_clear_all_keeps_other_namespaces() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();
        let other = PersistentCache::open(temp_dir.path(), "other").unwrap();

        cache.store(&Digest::of("a"), &1).unwrap();
        cache.store(&Digest::of("b"), &2).unwrap();
        other.store(&Digest::of("a"), &3).unwrap();
        fs::write(cache.dir().join("notes.txt"), "keep me").unwrap();

        assert_eq!(cache.clear_all().unwrap(), 2);
        assert!(!cache.exists(&Digest::of("a")));
        assert!(other.exists(&Digest::of("a")));
        assert!(cache.dir().join("notes.txt").is_file());
    }

    #[test]
    fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let cache = PersistentCache::open(temp_dir.path(), QUERY_NAMESPACE).unwrap();

        let empty = cache.stats().unwrap();
        assert_eq!(empty.entries, 0);
        assert_eq!(empty.size_bytes, 0);

        cache.store(&Digest::of("a"), &studies()).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert!(stats.size_bytes > 0);
        assert_eq!(stats.cache_dir, cache.dir());
    }
}
