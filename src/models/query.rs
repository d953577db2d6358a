//! GraphQL query descriptors and their cache identity.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::marker::PhantomData;

/// Number of hex characters kept from the SHA-256 of a query
pub const DIGEST_LEN: usize = 16;

/// Deterministic cache key derived from a query's text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    /// Digest of the given query text
    pub fn of(text: &str) -> Self {
        let hash = Sha256::digest(text.as_bytes());
        let mut hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
        hex.truncate(DIGEST_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A GraphQL query together with the shape its response must validate against.
///
/// `T` is the full response type, usually [`GraphQlResponse<Data>`]. Two queries
/// with the same text share a cache entry no matter which `T` they name.
#[derive(Debug)]
pub struct Query<T> {
    text: String,
    refresh: bool,
    shape: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            refresh: self.refresh,
            shape: PhantomData,
        }
    }
}

impl<T> Query<T>
where
    T: DeserializeOwned + Serialize,
{
    /// Create a query from its GraphQL text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            refresh: false,
            shape: PhantomData,
        }
    }

    /// Bypass the cached value for this call; the fresh result is still written back
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// The GraphQL text sent to the server
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the cache read is skipped
    pub fn is_refresh(&self) -> bool {
        self.refresh
    }

    /// Cache key for this query
    pub fn digest(&self) -> Digest {
        Digest::of(&self.text)
    }

    /// JSON request body (`{"query": ...}`)
    pub fn payload(&self) -> String {
        serde_json::json!({ "query": self.text }).to_string()
    }
}

/// Standard GraphQL response envelope.
///
/// Unknown sibling keys (such as `errors` alongside valid `data`) are ignored;
/// a missing or mistyped `data` fails validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: T,
}

/// Response whose `data` must be a JSON object but is otherwise unchecked.
///
/// An `errors`-only body or `"data": null` fails to decode as this type.
pub type UntypedResponse = GraphQlResponse<serde_json::Map<String, serde_json::Value>>;
