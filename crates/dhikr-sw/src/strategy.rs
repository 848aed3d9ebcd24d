//! Request strategies and their fallback chains.
//!
//! | Category      | Strategy             | Fallback                                   |
//! |---------------|----------------------|--------------------------------------------|
//! | `StaticAsset` | cache-first          | cache re-check → 503                       |
//! | `HtmlPage`    | network-first (page) | exact cache → root document → offline page |
//! | `Other`       | network-first        | cache → 503                                |
//!
//! Strategies never fail: store errors degrade to a cache miss and every
//! chain ends in a synthesized response.

use std::sync::Arc;

use http::Method;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{Cache, CacheStore, MatchScope};
use crate::classify::RoutingCategory;
use crate::config::WorkerConfig;
use crate::fetch::{Request, Response};
use crate::network::{fetch_bounded, Network};
use crate::offline;
use crate::SwError;

/// Dispatches intercepted requests to a strategy.
pub struct Router<S: ?Sized, N: ?Sized> {
    config: Arc<WorkerConfig>,
    namespace: String,
    root_url: Url,
    store: Arc<S>,
    network: Arc<N>,
}

impl<S, N> Router<S, N>
where
    S: CacheStore + ?Sized,
    N: Network + ?Sized,
{
    pub fn new(config: Arc<WorkerConfig>, store: Arc<S>, network: Arc<N>) -> Self {
        Self {
            namespace: config.namespace(),
            root_url: config.root_url(),
            config,
            store,
            network,
        }
    }

    /// Classify and handle a same-origin GET request.
    pub async fn handle(&self, request: &Request) -> Response {
        let category = RoutingCategory::classify(request.path());
        debug!(url = %request.url, category = category.as_str(), "Routing request");

        match category {
            RoutingCategory::StaticAsset => self.cache_first(request).await,
            RoutingCategory::HtmlPage => self.network_first_page(request).await,
            RoutingCategory::Other => self.network_first(request).await,
        }
    }

    /// Current-namespace hit wins without touching the network.
    pub async fn cache_first(&self, request: &Request) -> Response {
        let scope = MatchScope::Namespace(&self.namespace);

        if let Some(hit) = self.lookup(request, scope).await {
            debug!(url = %request.url, "Cache hit");
            return hit;
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_copy(request, &response).await;
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Static asset fetch failed");
                // Another unit may have cached it while we were waiting.
                match self.lookup(request, scope).await {
                    Some(hit) => hit,
                    None => offline::service_unavailable(),
                }
            }
        }
    }

    /// Fresh when online; exact cache, then the app shell, then the offline page.
    pub async fn network_first_page(&self, request: &Request) -> Response {
        match self.fetch(request).await {
            Ok(response) if response.ok() => {
                if response.is_complete() {
                    self.store_copy(request, &response).await;
                }
                return response;
            }
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "Page fetch not ok, falling back");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Page fetch failed, falling back");
            }
        }

        if let Some(hit) = self.lookup(request, MatchScope::All).await {
            return hit;
        }

        let shell = Request::get(self.root_url.clone());
        if let Some(hit) = self.lookup(&shell, MatchScope::All).await {
            debug!(url = %request.url, "Serving app shell");
            return hit;
        }

        debug!(url = %request.url, "Serving offline page");
        offline::offline_page()
    }

    /// Network response as-is; cache only on success.
    pub async fn network_first(&self, request: &Request) -> Response {
        match self.fetch(request).await {
            Ok(response) => {
                if response.is_complete() && request.method == Method::GET {
                    self.store_copy(request, &response).await;
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed, trying cache");
                match self.lookup(request, MatchScope::All).await {
                    Some(hit) => hit,
                    None => offline::service_unavailable(),
                }
            }
        }
    }

    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        fetch_bounded(&*self.network, request, self.config.network_timeout()).await
    }

    async fn lookup(&self, request: &Request, scope: MatchScope<'_>) -> Option<Response> {
        match self.store.match_entry(&request.cache_key(), scope).await {
            Ok(entry) => entry.as_ref().map(Response::from_entry),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Persist a duplicate; the original goes back to the page.
    async fn store_copy(&self, request: &Request, response: &Response) {
        let copy = response.duplicate();
        let result = async {
            let cache = Cache::open(&*self.store, &self.namespace).await?;
            cache.put(request, copy).await
        }
        .await;

        if let Err(e) = result {
            warn!(url = %request.url, error = %e, "Failed to cache response");
        }
    }
}
