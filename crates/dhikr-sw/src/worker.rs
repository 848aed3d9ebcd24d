//! The worker as seen by its host.

use std::sync::Arc;

use http::Method;
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::cache::CacheStore;
use crate::config::WorkerConfig;
use crate::control::{ControlChannel, ControlOutcome, ControlReply};
use crate::fetch::{FetchOutcome, Request};
use crate::lifecycle::{ActivateReport, HostCommand, InstallReport, Lifecycle, WorkerState};
use crate::network::Network;
use crate::strategy::Router;
use crate::SwError;

/// One version of the offline worker, bound to a store and a network.
pub struct ServiceWorker<S: ?Sized, N: ?Sized> {
    config: Arc<WorkerConfig>,
    lifecycle: Lifecycle<S, N>,
    router: Router<S, N>,
    control: ControlChannel<S>,
}

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStore + ?Sized,
    N: Network + ?Sized,
{
    /// Build a worker. The configuration is validated here and never re-read.
    pub fn new(config: WorkerConfig, store: Arc<S>, network: Arc<N>) -> Result<Self, SwError> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            lifecycle: Lifecycle::new(config.clone(), store.clone(), network.clone()),
            router: Router::new(config.clone(), store.clone(), network),
            control: ControlChannel::new(config.clone(), store),
            config,
        })
    }

    /// Rebuild the worker that was last activated against `store`.
    ///
    /// Used when a new version cannot install: the previous version keeps
    /// serving from its namespace. `None` when nothing was activated before
    /// or its namespace is gone.
    pub async fn restore(
        config: &WorkerConfig,
        store: Arc<S>,
        network: Arc<N>,
    ) -> Result<Option<Self>, SwError> {
        let Some(namespace) = store.active().await? else {
            return Ok(None);
        };
        let Some(previous) = config.for_namespace(&namespace) else {
            warn!(%namespace, cache_name = %config.cache_name, "Active namespace belongs to another cache");
            return Ok(None);
        };

        let worker = Self::new(previous, store, network)?;
        if worker.lifecycle.resume().await? {
            Ok(Some(worker))
        } else {
            Ok(None)
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    pub async fn on_install(&self) -> Result<InstallReport, SwError> {
        self.lifecycle.install().await
    }

    pub async fn on_activate(&self) -> Result<ActivateReport, SwError> {
        self.lifecycle.activate().await
    }

    /// Offer a request to the worker.
    ///
    /// Non-GET and cross-origin requests pass through untouched, as does
    /// everything while the worker is not yet active. Intercepted requests
    /// always get a response, fetched without the page's validators or range.
    pub async fn on_fetch(&self, request: Request) -> FetchOutcome {
        if request.method != Method::GET || !request.is_same_origin(&self.config.origin) {
            trace!(url = %request.url, method = %request.method, "Passing through");
            return FetchOutcome::Passthrough(request);
        }
        if !self.state().await.can_intercept_fetch() {
            trace!(url = %request.url, "Worker not active, passing through");
            return FetchOutcome::Passthrough(request);
        }

        let request = request.without_conditionals();
        FetchOutcome::Respond(self.router.handle(&request).await)
    }

    /// Handle a control message. `None` means no reply.
    pub async fn on_message(&self, message: &JsonValue) -> Option<ControlOutcome> {
        self.control.handle(message).await
    }

    /// Handle a control message that carries its own reply port.
    pub async fn post_message(
        &self,
        message: &JsonValue,
        reply: oneshot::Sender<ControlReply>,
    ) -> Option<HostCommand> {
        self.control.on_message(message, reply).await
    }
}
