//! Bounded-concurrency file downloads.
//!
//! Transfers are streamed chunk by chunk straight to disk while holding one
//! permit of a counting semaphore, so at most `max_concurrent` files are in
//! flight no matter how many tasks are queued. A destination that already
//! exists is treated as done and never requested again.
//!
//! A transfer that fails midway leaves its partial file behind, and a later
//! run will skip it. Delete such files by hand before retrying.

use futures_util::future::join_all;
use futures_util::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::config::DownloadConfig;
use crate::models::{DownloadOutcome, DownloadTask};
use crate::transport::{Transport, TransportFailure};

/// Errors for a single file transfer
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The request failed before or during the transfer
    #[error("Download of {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportFailure,
    },

    /// The server answered with a non-success status
    #[error("Download of {url} failed with HTTP status {status}")]
    Status { url: String, status: u16 },

    /// The destination could not be written
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The concurrency limiter was shut down
    #[error("Download limiter closed")]
    LimiterClosed,
}

impl DownloadError {
    fn transport(url: &str, failure: TransportFailure) -> Self {
        match failure {
            TransportFailure::Status { status, .. } => DownloadError::Status {
                url: url.to_string(),
                status,
            },
            source => DownloadError::Transport {
                url: url.to_string(),
                source,
            },
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        DownloadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Streams remote files to local paths under a fixed concurrency ceiling
#[derive(Debug, Clone)]
pub struct BoundedDownloader {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl BoundedDownloader {
    /// Create a downloader allowing `max_concurrent` simultaneous transfers (at least one)
    pub fn new(transport: Arc<dyn Transport>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &DownloadConfig) -> Self {
        Self::new(transport, config.max_concurrent)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Download `url` to `destination` unless a file is already there
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        if destination.is_file() {
            tracing::debug!("Skipping {}: {} exists", url, destination.display());
            return Ok(DownloadOutcome::Skipped);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DownloadError::LimiterClosed)?;

        // Another task for the same destination may have finished while we queued.
        if destination.is_file() {
            return Ok(DownloadOutcome::Skipped);
        }

        tracing::info!("Downloading {} -> {}", url, destination.display());

        let mut stream = self
            .transport
            .open_stream(url)
            .await
            .map_err(|e| DownloadError::transport(url, e))?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        let mut bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::warn!("Transfer of {} interrupted after {} bytes", url, bytes);
                DownloadError::transport(url, e)
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            bytes += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        tracing::debug!("Downloaded {} bytes to {}", bytes, destination.display());
        Ok(DownloadOutcome::Downloaded { bytes })
    }

    /// Run every task concurrently under the shared ceiling; results follow input order
    pub async fn download_all(
        &self,
        tasks: impl IntoIterator<Item = DownloadTask>,
    ) -> Vec<Result<DownloadOutcome, DownloadError>> {
        let downloads = tasks
            .into_iter()
            .map(|task| async move { self.download(&task.url, &task.destination).await });
        let results = join_all(downloads).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r, Ok(DownloadOutcome::Skipped)))
            .count();
        tracing::info!(
            "Downloads finished: {} total, {} skipped, {} failed",
            results.len(),
            skipped,
            failed
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use bytes::Bytes;
    use std::time::Duration;
    use tempfile::TempDir;

    fn chunks(name: &str) -> Vec<Bytes> {
        vec![
            Bytes::from(format!("{}:", name)),
            Bytes::from_static(b"0123456789"),
            Bytes::from_static(b"abcdef"),
        ]
    }

    fn file_server(count: usize) -> Arc<MockTransport> {
        let mock = MockTransport::with_body("{}").chunk_delay(Duration::from_millis(5));
        for i in 0..count {
            let name = format!("file{}.raw", i);
            mock.add_file(format!("mock://files/{}", name), chunks(&name));
        }
        Arc::new(mock)
    }

    fn tasks(count: usize, dir: &Path) -> Vec<DownloadTask> {
        (0..count)
            .map(|i| {
                DownloadTask::new(
                    format!("mock://files/file{}.raw", i),
                    format!("study/file{}.raw", i),
                )
                .rooted_at(dir)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ceiling_is_never_exceeded() {
        let dir = TempDir::new().unwrap();
        let transport = file_server(20);
        let downloader = BoundedDownloader::new(transport.clone(), 5);

        let results = downloader.download_all(tasks(20, dir.path())).await;

        assert_eq!(results.len(), 20);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(DownloadOutcome::Downloaded { .. }))));
        assert!(transport.peak_open_streams() <= 5);
        assert!(transport.peak_open_streams() > 1);
        assert_eq!(transport.open_streams(), 0);

        let content = std::fs::read(dir.path().join("study/file7.raw")).unwrap();
        assert_eq!(content, b"file7.raw:0123456789abcdef");
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_files() {
        let dir = TempDir::new().unwrap();
        let transport = file_server(20);
        let downloader = BoundedDownloader::new(transport.clone(), 5);

        downloader.download_all(tasks(20, dir.path())).await;
        assert_eq!(transport.stream_calls(), 20);

        let rerun = downloader.download_all(tasks(20, dir.path())).await;
        assert!(rerun
            .iter()
            .all(|r| matches!(r, Ok(DownloadOutcome::Skipped))));
        assert_eq!(transport.stream_calls(), 20);
    }

    #[tokio::test]
    async fn test_missing_file_reports_status_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = file_server(0);
        let downloader = BoundedDownloader::new(transport, 2);
        let destination = dir.path().join("missing.raw");

        let err = downloader
            .download("mock://files/missing.raw", &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_download_reports_byte_count() {
        let dir = TempDir::new().unwrap();
        let transport = file_server(1);
        let downloader = BoundedDownloader::new(transport, 1);

        let outcome = downloader
            .download("mock://files/file0.raw", &dir.path().join("file0.raw"))
            .await
            .unwrap();
        assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 26 });
    }

    #[test]
    fn test_zero_ceiling_is_clamped() {
        let downloader = BoundedDownloader::new(Arc::new(MockTransport::with_body("{}")), 0);
        assert_eq!(downloader.max_concurrent(), 1);
    }
}
