//! In-process cache storage.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheStore, MatchScope};
use crate::fetch::CacheKey;
use crate::SwError;

/// Entries of a single namespace.
#[derive(Debug, Default, Clone)]
pub(crate) struct Namespace {
    /// Creation order, used to search oldest first.
    seq: u64,
    pub(crate) entries: HashMap<CacheKey, CacheEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    namespaces: HashMap<String, Namespace>,
    active: Option<String>,
}

impl Inner {
    fn ordered(&self) -> Vec<(&String, &Namespace)> {
        let mut all: Vec<_> = self.namespaces.iter().collect();
        all.sort_by_key(|(_, ns)| ns.seq);
        all
    }

    fn create(&mut self, name: &str) -> bool {
        if self.namespaces.contains_key(name) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.namespaces.insert(
            name.to_string(),
            Namespace {
                seq,
                entries: HashMap::new(),
            },
        );
        true
    }
}

/// Cache storage held in memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    inner: RwLock<Inner>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of one namespace's entries.
    pub(crate) async fn snapshot(&self, namespace: &str) -> Option<Vec<(CacheKey, CacheEntry)>> {
        let inner = self.inner.read().await;
        inner.namespaces.get(namespace).map(|ns| {
            let mut entries: Vec<_> = ns
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        })
    }

    /// Replace a namespace wholesale.
    pub(crate) async fn restore(&self, namespace: &str, entries: Vec<(CacheKey, CacheEntry)>) {
        let mut inner = self.inner.write().await;
        inner.create(namespace);
        if let Some(ns) = inner.namespaces.get_mut(namespace) {
            ns.entries = entries.into_iter().collect();
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn create(&self, namespace: &str) -> Result<bool, SwError> {
        Ok(self.inner.write().await.create(namespace))
    }

    async fn has(&self, namespace: &str) -> Result<bool, SwError> {
        Ok(self.inner.read().await.namespaces.contains_key(namespace))
    }

    async fn match_entry(
        &self,
        key: &CacheKey,
        scope: MatchScope<'_>,
    ) -> Result<Option<CacheEntry>, SwError> {
        let inner = self.inner.read().await;
        let found = match scope {
            MatchScope::Namespace(name) => inner
                .namespaces
                .get(name)
                .and_then(|ns| ns.entries.get(key)),
            MatchScope::All => inner
                .ordered()
                .into_iter()
                .find_map(|(_, ns)| ns.entries.get(key)),
        };
        Ok(found.cloned())
    }

    async fn put_entry(
        &self,
        namespace: &str,
        key: CacheKey,
        entry: CacheEntry,
    ) -> Result<(), SwError> {
        let mut inner = self.inner.write().await;
        inner.create(namespace);
        if let Some(ns) = inner.namespaces.get_mut(namespace) {
            ns.entries.insert(key, entry);
        }
        Ok(())
    }

    async fn put_entries(
        &self,
        namespace: &str,
        entries: Vec<(CacheKey, CacheEntry)>,
    ) -> Result<(), SwError> {
        let mut inner = self.inner.write().await;
        inner.create(namespace);
        if let Some(ns) = inner.namespaces.get_mut(namespace) {
            ns.entries.extend(entries);
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<bool, SwError> {
        let mut inner = self.inner.write().await;
        if inner.active.as_deref() == Some(namespace) {
            inner.active = None;
        }
        Ok(inner.namespaces.remove(namespace).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, SwError> {
        let inner = self.inner.read().await;
        Ok(inner.ordered().into_iter().map(|(name, _)| name.clone()).collect())
    }

    async fn entry_keys(&self, namespace: &str) -> Result<Vec<CacheKey>, SwError> {
        let inner = self.inner.read().await;
        let mut keys: Vec<CacheKey> = inner
            .namespaces
            .get(namespace)
            .map(|ns| ns.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn set_active(&self, namespace: &str) -> Result<(), SwError> {
        let mut inner = self.inner.write().await;
        if !inner.namespaces.contains_key(namespace) {
            return Err(SwError::CacheError(format!(
                "cannot activate missing namespace {namespace}"
            )));
        }
        inner.active = Some(namespace.to_string());
        Ok(())
    }

    async fn active(&self) -> Result<Option<String>, SwError> {
        Ok(self.inner.read().await.active.clone())
    }
}
