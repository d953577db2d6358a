//! The harvesting core: validated, cached, rate-limited query execution.
//!
//! - [`QueryExecutor`]: cache lookup, throttled dispatch, validation, write-back
//! - [`fetch_all`]: offset pagination until the first empty page
//! - [`fan_out`]: one concurrent unit per input, all-or-nothing
//! - [`Harvester`]: wires the shared pieces together from a [`Config`](crate::config::Config)

mod diagnostics;
mod executor;
mod fan_out;
mod harvester;
mod pagination;

pub use diagnostics::DiagnosticSink;
pub use executor::{QueryExecutor, ShapeMismatch};
pub use fan_out::{fan_out, fan_out_settled};
pub use harvester::Harvester;
pub use pagination::{fetch_all, OffsetTemplate, PageTemplate};

use std::path::PathBuf;

use crate::transport::TransportFailure;
use crate::utils::CacheError;

/// Errors surfaced by query execution
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The request failed on the wire or came back with a non-success status
    #[error("Transport error: {message}{}", artifact_note(.artifact))]
    Transport {
        message: String,
        status: Option<u16>,
        artifact: Option<PathBuf>,
    },

    /// The response did not match the expected shape
    #[error("Schema error: {message}{}", artifact_note(.artifact))]
    Schema {
        message: String,
        artifact: Option<PathBuf>,
    },

    /// The query cache could not be read or written
    #[error("Cache error: {0}")]
    CacheIo(#[from] CacheError),

    /// The transport could not be constructed
    #[error("Setup error: {0}")]
    Setup(String),
}

impl HarvestError {
    /// Short name of the error kind, as shown to users
    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Transport { .. } => "TransportError",
            HarvestError::Schema { .. } => "SchemaError",
            HarvestError::CacheIo(_) => "CacheIOError",
            HarvestError::Setup(_) => "SetupError",
        }
    }

    /// Where the diagnostic dump for this failure was written, if anywhere
    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            HarvestError::Transport { artifact, .. } | HarvestError::Schema { artifact, .. } => {
                artifact.as_ref()
            }
            _ => None,
        }
    }
}

impl From<TransportFailure> for HarvestError {
    fn from(failure: TransportFailure) -> Self {
        HarvestError::Transport {
            status: failure.status(),
            message: failure.to_string(),
            artifact: None,
        }
    }
}

fn artifact_note(artifact: &Option<PathBuf>) -> String {
    match artifact {
        Some(path) => format!(" (details dumped to {})", path.display()),
        None => String::new(),
    }
}
