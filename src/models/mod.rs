//! Core data structures for the harvesting layer.

mod download;
mod query;

pub use download::{DownloadOutcome, DownloadTask};
pub use query::{Digest, GraphQlResponse, Query, UntypedResponse, DIGEST_LEN};
