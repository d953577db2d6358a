//! Download task descriptors.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A remote file and where it should land locally.
///
/// Tasks are idempotent: if `destination` already exists the download is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Resolve a relative destination against `base`
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.destination.is_relative() {
            self.destination = base.join(&self.destination);
        }
        self
    }
}

/// What happened to a single download task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The file was streamed to disk
    Downloaded { bytes: u64 },

    /// The destination already existed; no request was made
    Skipped,
}

impl DownloadOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, DownloadOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_at_only_touches_relative_paths() {
        let base = Path::new("/data/downloads");

        let task = DownloadTask::new("http://x/a", "primary_tumor/a.mzid.gz").rooted_at(base);
        assert_eq!(
            task.destination,
            PathBuf::from("/data/downloads/primary_tumor/a.mzid.gz")
        );

        let task = DownloadTask::new("http://x/b", "/abs/b.mzid.gz").rooted_at(base);
        assert_eq!(task.destination, PathBuf::from("/abs/b.mzid.gz"));
    }

    #[test]
    fn test_manifest_deserializes() {
        let json = r#"[{"url": "http://x/a", "destination": "a.gz"}]"#;
        let tasks: Vec<DownloadTask> = serde_json::from_str(json).unwrap();
        assert_eq!(tasks, vec![DownloadTask::new("http://x/a", "a.gz")]);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&DownloadOutcome::Downloaded { bytes: 3 }).unwrap();
        assert_eq!(json, r#"{"status":"downloaded","bytes":3}"#);
        assert!(DownloadOutcome::Skipped.is_skipped());
    }
}
