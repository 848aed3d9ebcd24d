//! Durable cache storage: one JSON document per namespace.
//!
//! Every namespace lives in memory and is written through to
//! `<root>/<namespace>.json` on each mutation. A file that cannot be read back
//! is treated as an empty namespace, the same way a browser may silently drop
//! cache data under storage pressure.
//!
//! The namespace of the last activated worker is kept in `<root>/.active` so
//! a restarted host can put that worker back in control without the network.
//! Writes are serialized; each one snapshots memory under the write lock, so
//! the newest state is what lands on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheEntry, CacheStore, MatchScope, MemoryCacheStorage};
use crate::fetch::CacheKey;
use crate::SwError;

const EXTENSION: &str = "json";
const ACTIVE_MARKER: &str = ".active";

#[derive(Debug, Serialize, Deserialize)]
struct NamespaceFile {
    name: String,
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    entry: CacheEntry,
}

/// Cache storage persisted under a directory.
#[derive(Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
    memory: MemoryCacheStorage,
    write_lock: Mutex<()>,
}

impl DiskCacheStorage {
    /// Open (or create) storage rooted at `root`, loading every namespace found.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, SwError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let storage = Self {
            root,
            memory: MemoryCacheStorage::new(),
            write_lock: Mutex::new(()),
        };
        storage.load_all().await?;
        storage.load_active().await;
        Ok(storage)
    }

    async fn load_all(&self) -> Result<(), SwError> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_name(stem).is_ok() {
                let modified = item
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .ok();
                names.push((modified, stem.to_string(), path));
            }
        }
        // Oldest file first so cross-namespace lookups keep creation order.
        names.sort();

        for (_, name, path) in names {
            let entries = match read_namespace(&path).await {
                Ok(file) => file
                    .entries
                    .into_iter()
                    .map(|stored| (stored.key, stored.entry))
                    .collect(),
                Err(e) => {
                    warn!(namespace = %name, error = %e, "Unreadable cache file, starting empty");
                    Vec::new()
                }
            };
            debug!(namespace = %name, entries = entries.len(), "Loaded cache namespace");
            self.memory.restore(&name, entries).await;
        }
        Ok(())
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.{EXTENSION}"))
    }

    async fn load_active(&self) {
        let name = match tokio::fs::read_to_string(self.root.join(ACTIVE_MARKER)).await {
            Ok(name) => name.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(error = %e, "Unreadable active marker, ignoring");
                return;
            }
        };
        if let Err(e) = self.memory.set_active(&name).await {
            warn!(namespace = %name, error = %e, "Active namespace is gone, ignoring marker");
        }
    }

    /// Write one namespace to disk.
    async fn persist(&self, namespace: &str) -> Result<(), SwError> {
        let _guard = self.write_lock.lock().await;
        let Some(entries) = self.memory.snapshot(namespace).await else {
            return Ok(());
        };
        let file = NamespaceFile {
            name: namespace.to_string(),
            entries: entries
                .into_iter()
                .map(|(key, entry)| StoredEntry { key, entry })
                .collect(),
        };
        let json = serde_json::to_vec(&file)?;
        self.replace_file(&format!("{namespace}.{EXTENSION}"), &json).await
    }

    /// Write to a sibling temp file and rename so readers never see a torn file.
    async fn replace_file(&self, name: &str, contents: &[u8]) -> Result<(), SwError> {
        let temp = self.root.join(format!(".{name}.tmp"));
        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, self.root.join(name)).await?;
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<(), SwError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn read_namespace(path: &Path) -> Result<NamespaceFile, SwError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Namespace identifiers become file names.
fn validate_name(namespace: &str) -> Result<(), SwError> {
    let invalid = namespace.is_empty()
        || namespace.starts_with('.')
        || namespace
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if invalid {
        return Err(SwError::CacheError(format!(
            "invalid namespace identifier: {namespace:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl CacheStore for DiskCacheStorage {
    async fn create(&self, namespace: &str) -> Result<bool, SwError> {
        validate_name(namespace)?;
        let created = self.memory.create(namespace).await?;
        if created {
            self.persist(namespace).await?;
        }
        Ok(created)
    }

    async fn has(&self, namespace: &str) -> Result<bool, SwError> {
        self.memory.has(namespace).await
    }

    async fn match_entry(
        &self,
        key: &CacheKey,
        scope: MatchScope<'_>,
    ) -> Result<Option<CacheEntry>, SwError> {
        self.memory.match_entry(key, scope).await
    }

    async fn put_entry(
        &self,
        namespace: &str,
        key: CacheKey,
        entry: CacheEntry,
    ) -> Result<(), SwError> {
        validate_name(namespace)?;
        self.memory.put_entry(namespace, key, entry).await?;
        self.persist(namespace).await
    }

    async fn put_entries(
        &self,
        namespace: &str,
        entries: Vec<(CacheKey, CacheEntry)>,
    ) -> Result<(), SwError> {
        validate_name(namespace)?;
        self.memory.put_entries(namespace, entries).await?;
        self.persist(namespace).await
    }

    async fn delete(&self, namespace: &str) -> Result<bool, SwError> {
        validate_name(namespace)?;
        let _guard = self.write_lock.lock().await;
        let was_active = self.memory.active().await?.as_deref() == Some(namespace);
        let existed = self.memory.delete(namespace).await?;
        remove_if_present(&self.path_for(namespace)).await?;
        if was_active {
            remove_if_present(&self.root.join(ACTIVE_MARKER)).await?;
        }
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<String>, SwError> {
        self.memory.keys().await
    }

    async fn entry_keys(&self, namespace: &str) -> Result<Vec<CacheKey>, SwError> {
        self.memory.entry_keys(namespace).await
    }

    async fn set_active(&self, namespace: &str) -> Result<(), SwError> {
        validate_name(namespace)?;
        let _guard = self.write_lock.lock().await;
        self.memory.set_active(namespace).await?;
        self.replace_file(ACTIVE_MARKER, namespace.as_bytes()).await
    }

    async fn active(&self) -> Result<Option<String>, SwError> {
        self.memory.active().await
    }
}
