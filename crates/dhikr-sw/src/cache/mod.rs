//! Versioned, named storage of request → response snapshots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::{CacheKey, Request, Response};
use crate::SwError;

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL, without fragment.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers, in received order.
    pub headers: Vec<(String, String)>,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// Opaque responses have no inspectable status.
    #[serde(default)]
    pub opaque: bool,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ==================== Cache Store ====================

/// Which namespaces a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope<'a> {
    /// Only the named namespace.
    Namespace(&'a str),
    /// Every namespace, oldest first.
    All,
}

/// Persistent store of cache namespaces.
///
/// Implementations guard their own maps; there is no cross-call locking, so
/// concurrent writes to one key resolve as last write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the namespace if missing. Returns `true` when it was created.
    async fn create(&self, namespace: &str) -> Result<bool, SwError>;

    /// Check if a namespace exists.
    async fn has(&self, namespace: &str) -> Result<bool, SwError>;

    /// Look up an entry.
    async fn match_entry(
        &self,
        key: &CacheKey,
        scope: MatchScope<'_>,
    ) -> Result<Option<CacheEntry>, SwError>;

    /// Store an entry, replacing any previous value for the key.
    async fn put_entry(
        &self,
        namespace: &str,
        key: CacheKey,
        entry: CacheEntry,
    ) -> Result<(), SwError>;

    /// Store several entries in one namespace.
    ///
    /// Durable stores override this to write once for the whole batch.
    async fn put_entries(
        &self,
        namespace: &str,
        entries: Vec<(CacheKey, CacheEntry)>,
    ) -> Result<(), SwError> {
        for (key, entry) in entries {
            self.put_entry(namespace, key, entry).await?;
        }
        Ok(())
    }

    /// Delete a namespace and everything in it.
    ///
    /// Deleting the active namespace clears the active marker.
    async fn delete(&self, namespace: &str) -> Result<bool, SwError>;

    /// All namespace identifiers, oldest first.
    async fn keys(&self) -> Result<Vec<String>, SwError>;

    /// All entry keys in one namespace.
    async fn entry_keys(&self, namespace: &str) -> Result<Vec<CacheKey>, SwError>;

    /// Record the namespace of the worker that was just activated.
    async fn set_active(&self, namespace: &str) -> Result<(), SwError>;

    /// The namespace recorded by the last activation, if it still exists.
    async fn active(&self) -> Result<Option<String>, SwError>;
}

// ==================== Cache ====================

/// An open namespace.
pub struct Cache<'s, S: CacheStore + ?Sized> {
    store: &'s S,
    name: String,
}

impl<'s, S: CacheStore + ?Sized> Cache<'s, S> {
    /// Open a cache (creates if doesn't exist).
    pub async fn open(store: &'s S, namespace: &str) -> Result<Self, SwError> {
        store.create(namespace).await?;
        Ok(Self {
            store,
            name: namespace.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request in this namespace.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, SwError> {
        let entry = self
            .store
            .match_entry(&request.cache_key(), MatchScope::Namespace(&self.name))
            .await?;
        Ok(entry.as_ref().map(Response::from_entry))
    }

    /// Store a response. The response is consumed.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), SwError> {
        let key = request.cache_key();
        let entry = response.into_entry(request);
        self.store.put_entry(&self.name, key, entry).await
    }

    /// Store a batch of responses, consuming them.
    pub async fn put_all(&self, items: Vec<(Request, Response)>) -> Result<(), SwError> {
        let entries = items
            .into_iter()
            .map(|(request, response)| (request.cache_key(), response.into_entry(&request)))
            .collect();
        self.store.put_entries(&self.name, entries).await
    }

    /// Get all keys.
    pub async fn keys(&self) -> Result<Vec<CacheKey>, SwError> {
        self.store.entry_keys(&self.name).await
    }
}
