//! Install and activate phases.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::cache::{Cache, CacheStore};
use crate::config::WorkerConfig;
use crate::fetch::{Request, Response};
use crate::network::{fetch_bounded, Network};
use crate::SwError;

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Initial state, nothing run yet.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed; never activates.
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

/// Instructions for the host, translated by its adapter into host calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Become eligible for activation without waiting for old clients.
    SkipWaiting,
    /// Take control of every open client now.
    ClaimClients,
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub namespace: String,
    pub core_cached: usize,
    pub optional_cached: usize,
    pub optional_failed: Vec<String>,
    pub command: HostCommand,
}

/// Outcome of a successful activation.
#[derive(Debug, Clone)]
pub struct ActivateReport {
    pub namespace: String,
    pub evicted: Vec<String>,
    pub command: HostCommand,
}

/// Drives the worker through install and activate.
pub struct Lifecycle<S: ?Sized, N: ?Sized> {
    config: Arc<WorkerConfig>,
    store: Arc<S>,
    network: Arc<N>,
    state: RwLock<WorkerState>,
}

impl<S, N> Lifecycle<S, N>
where
    S: CacheStore + ?Sized,
    N: Network + ?Sized,
{
    pub fn new(config: Arc<WorkerConfig>, store: Arc<S>, network: Arc<N>) -> Self {
        Self {
            config,
            store,
            network,
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    /// Seed the current namespace from the manifest.
    ///
    /// Any core asset failing fails the whole install: nothing from the core
    /// batch is stored, a namespace created by this attempt is removed, and
    /// the worker becomes [`WorkerState::Redundant`]. An already active
    /// worker only refreshes its entries and stays active either way.
    pub async fn install(&self) -> Result<InstallReport, SwError> {
        let resident = {
            let mut state = self.state.write().await;
            match *state {
                WorkerState::Installing | WorkerState::Activating => {
                    return Err(SwError::StateError(format!(
                        "cannot install while {:?}",
                        *state
                    )));
                }
                WorkerState::Activated => true,
                _ => {
                    *state = WorkerState::Installing;
                    false
                }
            }
        };

        let namespace = self.config.namespace();
        info!(%namespace, resident, "Installing");

        let existed = match self.store.has(&namespace).await {
            Ok(existed) => existed,
            Err(e) => {
                error!(%namespace, error = %e, "Install failed");
                if !resident {
                    self.set_state(WorkerState::Redundant).await;
                }
                return Err(e);
            }
        };

        match self.populate(&namespace).await {
            Ok(report) => {
                info!(
                    %namespace,
                    core = report.core_cached,
                    optional = report.optional_cached,
                    optional_failed = report.optional_failed.len(),
                    "Installed"
                );
                if !resident {
                    self.set_state(WorkerState::Installed).await;
                }
                Ok(report)
            }
            Err(e) => {
                error!(%namespace, error = %e, "Install failed");
                if !existed {
                    if let Err(cleanup) = self.store.delete(&namespace).await {
                        warn!(%namespace, error = %cleanup, "Failed to remove partial namespace");
                    }
                }
                if !resident {
                    self.set_state(WorkerState::Redundant).await;
                }
                Err(e)
            }
        }
    }

    /// Take control again from a namespace an earlier run activated, without
    /// touching the network. Returns `false` when that namespace is not this
    /// worker's or no longer exists.
    pub async fn resume(&self) -> Result<bool, SwError> {
        let namespace = self.config.namespace();
        if self.store.active().await?.as_deref() != Some(namespace.as_str()) {
            return Ok(false);
        }

        let mut state = self.state.write().await;
        if matches!(*state, WorkerState::Installing | WorkerState::Activating) {
            return Err(SwError::StateError(format!("cannot resume while {:?}", *state)));
        }
        *state = WorkerState::Activated;
        info!(%namespace, "Resumed from stored cache");
        Ok(true)
    }

    async fn populate(&self, namespace: &str) -> Result<InstallReport, SwError> {
        let cache = Cache::open(&*self.store, namespace).await?;

        let core = self.fetch_core().await?;
        let core_cached = core.len();
        cache.put_all(core).await?;

        let mut optional_cached = 0;
        let mut optional_failed = Vec::new();
        for path in &self.config.manifest.optional {
            match self.add_optional(&cache, path).await {
                Ok(()) => optional_cached += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "Optional asset not cached");
                    optional_failed.push(path.clone());
                }
            }
        }

        Ok(InstallReport {
            namespace: namespace.to_string(),
            core_cached,
            optional_cached,
            optional_failed,
            command: HostCommand::SkipWaiting,
        })
    }

    /// Fetch every core asset before storing any of them.
    async fn fetch_core(&self) -> Result<Vec<(Request, Response)>, SwError> {
        let requests = self
            .config
            .manifest
            .core
            .iter()
            .map(|path| self.config.resolve(path).map(Request::get))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;
        Ok(requests.into_iter().zip(responses).collect())
    }

    async fn add_optional(&self, cache: &Cache<'_, S>, path: &str) -> Result<(), SwError> {
        let request = Request::get(self.config.resolve(path)?);
        let response = self.fetch_asset(&request).await?;
        cache.put(&request, response).await
    }

    async fn fetch_asset(&self, request: &Request) -> Result<Response, SwError> {
        let response = fetch_bounded(&*self.network, request, self.config.network_timeout())
            .await
            .map_err(|e| SwError::InstallFailed(format!("{}: {e}", request.url)))?;
        if !response.ok() {
            return Err(SwError::InstallFailed(format!(
                "{} returned {}",
                request.url, response.status
            )));
        }
        Ok(response)
    }

    /// Evict every namespace but the current one.
    pub async fn activate(&self) -> Result<ActivateReport, SwError> {
        let previous = {
            let mut state = self.state.write().await;
            if !matches!(*state, WorkerState::Installed | WorkerState::Activated) {
                return Err(SwError::StateError(format!(
                    "cannot activate from {:?}; install has not completed",
                    *state
                )));
            }
            std::mem::replace(&mut *state, WorkerState::Activating)
        };

        let namespace = self.config.namespace();
        match self.evict_stale(&namespace).await {
            Ok(evicted) => {
                if let Err(e) = self.store.set_active(&namespace).await {
                    warn!(%namespace, error = %e, "Failed to record active namespace");
                }
                info!(%namespace, evicted = ?evicted, "Activated");
                self.set_state(WorkerState::Activated).await;
                Ok(ActivateReport {
                    namespace,
                    evicted,
                    command: HostCommand::ClaimClients,
                })
            }
            Err(e) => {
                error!(%namespace, error = %e, "Activation failed");
                self.set_state(previous).await;
                Err(e)
            }
        }
    }

    async fn evict_stale(&self, current: &str) -> Result<Vec<String>, SwError> {
        let mut evicted = Vec::new();
        for name in self.store.keys().await? {
            if name != current && self.store.delete(&name).await? {
                info!(namespace = %name, "Deleted stale cache");
                evicted.push(name);
            }
        }
        Ok(evicted)
    }
}
