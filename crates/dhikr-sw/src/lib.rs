//! # Dhikr Service Worker
//!
//! Offline caching and request routing for the dhikr counter web app.
//!
//! ## Features
//!
//! - **Cache storage**: versioned namespaces of request → response snapshots
//! - **Routing**: per-request strategy chosen from the request path
//! - **Strategies**: cache-first for static assets, network-first for pages
//!   and everything else, each with its own fallback chain
//! - **Lifecycle**: install seeds the current namespace, activate evicts
//!   stale ones
//! - **Control channel**: `GET_VERSION`, `SKIP_WAITING`, `CACHE_STATUS`
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker
//!     ├── Lifecycle ─────── on_install / on_activate ──→ HostCommand
//!     ├── Router ────────── on_fetch
//!     │       ├── RoutingCategory::classify(path)
//!     │       └── cache_first | network_first_page | network_first
//!     └── ControlChannel ── on_message ──→ ControlReply
//!
//! CacheStore (MemoryCacheStorage | DiskCacheStorage)
//!     └── namespace "{name}-v{version}"
//!             └── CacheKey → CacheEntry
//! ```
//!
//! The host owns the network ([`Network`]) and the cache store
//! ([`CacheStore`]); both are injected when the worker is built.

use std::time::Duration;

use dhikr_common::DhikrError;
use thiserror::Error;

pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod fetch;
pub mod lifecycle;
pub mod network;
pub mod offline;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use cache::{Cache, CacheEntry, CacheStore, DiskCacheStorage, MatchScope, MemoryCacheStorage};
pub use classify::RoutingCategory;
pub use config::{AssetManifest, WorkerConfig};
pub use control::{ControlChannel, ControlMessage, ControlOutcome, ControlReply};
pub use fetch::{CacheKey, FetchOutcome, Request, Response, ResponseSource};
pub use lifecycle::{ActivateReport, HostCommand, InstallReport, Lifecycle, WorkerState};
pub use network::Network;
pub use strategy::Router;
pub use worker::ServiceWorker;

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Network attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<DhikrError> for SwError {
    fn from(err: DhikrError) -> Self {
        match err {
            DhikrError::Timeout(after) => SwError::Timeout(after),
            DhikrError::Io(e) => SwError::IoError(e.to_string()),
            DhikrError::Config { message, .. } => SwError::ConfigError(message),
            other => SwError::NetworkError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SwError {
    fn from(err: std::io::Error) -> Self {
        SwError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for SwError {
    fn from(err: serde_json::Error) -> Self {
        SwError::CacheError(format!("serialization failed: {err}"))
    }
}
