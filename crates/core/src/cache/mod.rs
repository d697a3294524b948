//! Named response stores.
//!
//! A store is a persistent mapping from a request (method + URL) to a
//! [`ResponseSnapshot`]. Several stores coexist, distinguished only by name;
//! the name carries the version, so invalidation means deleting a whole store.
//!
//! The [`CacheStorage`] trait is the capability the interception layer is
//! given. Two backends implement it:
//!
//! - [`CacheDb`]: SQLite via tokio-rusqlite, WAL mode, versioned migrations
//! - [`MemoryStorage`]: process-local maps, for tests and ephemeral hosts

pub mod connection;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::Error;
use crate::{RequestDescriptor, ResponseSnapshot};

pub use connection::CacheDb;
pub use memory::MemoryStorage;

/// Marker stored for `Vary: *`, which never matches a later request.
const VARY_ANY: &str = "*";

/// Request headers settled per connection by the HTTP stack. Entries are never
/// told apart by them, whatever the response's `Vary` says.
const NEGOTIATED_HEADERS: &[&str] = &["accept-encoding", "connection", "host", "te", "user-agent"];

/// An entry as returned by store enumeration.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub method: String,
    pub url: String,
    pub response: ResponseSnapshot,
    /// RFC 3339 timestamp of the last write.
    pub stored_at: String,
}

/// Capability interface over a set of named stores.
///
/// Writes replace the whole value for a key, so concurrent writers to the same
/// request race benignly: the last write wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Look up a request. A missing store is a miss.
    async fn get(&self, name: &str, request: &RequestDescriptor) -> Result<Option<ResponseSnapshot>, Error>;

    /// Store a response for a request, creating the store if needed.
    async fn put(&self, name: &str, request: &RequestDescriptor, response: &ResponseSnapshot) -> Result<(), Error>;

    /// Store a batch atomically: either every entry is written or none is.
    async fn put_all(&self, name: &str, entries: &[(RequestDescriptor, ResponseSnapshot)]) -> Result<(), Error>;

    /// Delete a whole store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Names of all existing stores, sorted.
    async fn list_names(&self) -> Result<Vec<String>, Error>;

    /// All entries of a store, ordered by URL.
    async fn entries(&self, name: &str) -> Result<Vec<StoredEntry>, Error>;

    /// Number of entries in a store.
    async fn count(&self, name: &str) -> Result<usize, Error>;
}

/// Request header values a response varies on, captured at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaryValues(Vec<(String, Option<String>)>);

impl VaryValues {
    /// Capture the request's values for each header named in the response's `Vary`.
    pub fn capture(request: &RequestDescriptor, response: &ResponseSnapshot) -> Self {
        let values = response
            .vary()
            .into_iter()
            .filter(|name| !NEGOTIATED_HEADERS.contains(&name.as_str()))
            .map(|name| {
                let value = request.header_value(&name).map(str::to_string);
                (name, value)
            })
            .collect();
        Self(values)
    }

    /// Whether a later request carries the same values.
    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        self.0.iter().all(|(name, value)| {
            name != VARY_ANY && request.header_value(name) == value.as_deref()
        })
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("store name must not be empty".into()));
    }
    Ok(())
}
