//! Request interception cache.
//!
//! Sits between the application and the network and decides, per request,
//! whether to answer from a named store, from the network, or with a
//! synthesized offline answer. Two stores are used:
//!
//! - the static store, filled from the manifest at install and served cache-first
//! - the dynamic store, filled by successful API responses and served network-first
//!
//! Lifecycle: [`InterceptCache::install`] populates the static store,
//! [`InterceptCache::activate`] deletes every store that is not current, and
//! only then should the host route requests through [`InterceptCache::intercept`].
//!
//! Per request: `Received -> Classified -> NetworkAttempt | CacheLookup -> Hit | Miss
//! -> [cache-write] -> Resolved | Fallback`, or an error on the static path.

mod fallback;

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::RwLock;
use url::Url;

use gramsevak_core::{AppConfig, CacheStorage, Error, RequestClass, RequestDescriptor, ResponseSnapshot};

use crate::fetch::{Network, resolve};

pub use fallback::{
    OFFLINE_ANSWER, OFFLINE_SCHEME_NAME, OFFLINE_SOURCE, OfflineAnswer, offline_response,
};

/// Resolved settings for an [`InterceptCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub static_store: String,
    pub dynamic_store: String,
    /// Absolute asset URLs cached at install.
    pub manifest: Vec<Url>,
    pub api_patterns: Vec<String>,
    /// Application shell served to failed navigations.
    pub shell_url: Url,
}

impl CacheSettings {
    /// Resolve manifest entries and the shell path against the configured origin.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let manifest = config
            .manifest
            .iter()
            .map(|entry| resolve(&config.origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let shell_url = resolve(&config.origin, &config.shell_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.shell_path)))?;

        Ok(Self {
            static_store: config.static_store.clone(),
            dynamic_store: config.dynamic_store.clone(),
            manifest,
            api_patterns: config.api_patterns.clone(),
            shell_url,
        })
    }
}

/// Lifecycle phase of the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// The first install failed; nothing is served until a retry succeeds.
    Redundant,
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub store: String,
    /// Distinct manifest entries written.
    pub cached: usize,
    /// Take over immediately instead of waiting for existing clients to release.
    pub skip_waiting: bool,
}

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stores deleted because their name is no longer current.
    pub deleted: Vec<String>,
    /// Start controlling already-open clients, not only future ones.
    pub claimed: bool,
}

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

/// What the interception layer decided for a request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Not intercepted; the host must perform the request itself.
    PassThrough,
    /// A real response, from the network or a store.
    Resolved { response: ResponseSnapshot, source: ResponseSource },
    /// The synthesized offline answer (dynamic requests only).
    Fallback(ResponseSnapshot),
}

impl Outcome {
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Outcome::PassThrough => None,
            Outcome::Resolved { response, .. } | Outcome::Fallback(response) => Some(response),
        }
    }

    /// The response to hand back, or `None` when the host must fetch it itself.
    pub fn into_response(self) -> Option<ResponseSnapshot> {
        match self {
            Outcome::PassThrough => None,
            Outcome::Resolved { response, .. } | Outcome::Fallback(response) => Some(response),
        }
    }
}

/// The request interception cache.
///
/// Stores and network are injected capabilities; tasks handling different
/// requests share nothing but the store.
pub struct InterceptCache<S: CacheStorage, N: Network> {
    storage: Arc<S>,
    network: Arc<N>,
    settings: Arc<CacheSettings>,
    phase: Arc<RwLock<Phase>>,
}

impl<S: CacheStorage, N: Network> InterceptCache<S, N> {
    pub fn new(storage: S, network: N, settings: CacheSettings) -> Self {
        Self {
            storage: Arc::new(storage),
            network: Arc::new(network),
            settings: Arc::new(settings),
            phase: Arc::new(RwLock::new(Phase::Parsed)),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: Phase) {
        tracing::debug!(?phase, "lifecycle phase");
        *self.phase.write().await = phase;
    }

    /// Fetch every manifest asset and store them in the static store.
    ///
    /// All assets are fetched before anything is written, and the write is
    /// atomic: if any asset fails (transport error or non-2xx), nothing is
    /// committed and the install must be retried. Re-running with the same
    /// manifest overwrites entries in place.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let previous = self.phase().await;
        self.set_phase(Phase::Installing).await;

        match self.populate_static().await {
            Ok(cached) => {
                // A refresh of an active component keeps serving throughout.
                let phase = if previous == Phase::Activated { Phase::Activated } else { Phase::Installed };
                self.set_phase(phase).await;
                tracing::info!(store = %self.settings.static_store, cached, "install complete; skipping wait");
                Ok(InstallReport { store: self.settings.static_store.clone(), cached, skip_waiting: true })
            }
            Err(e) => {
                // An already-active component keeps serving its existing stores.
                let phase = if previous == Phase::Activated { Phase::Activated } else { Phase::Redundant };
                self.set_phase(phase).await;
                tracing::error!(store = %self.settings.static_store, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn populate_static(&self) -> Result<usize, Error> {
        let mut seen = HashSet::new();
        let requests: Vec<RequestDescriptor> = self
            .settings
            .manifest
            .iter()
            .filter(|url| seen.insert(url.as_str().to_string()))
            .map(|url| RequestDescriptor::get(url.clone()))
            .collect();

        let fetches = requests.into_iter().map(|request| async move {
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.is_ok() {
                return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status)));
            }
            Ok::<_, Error>((request, response))
        });

        let entries = try_join_all(fetches).await?;

        self.storage
            .put_all(&self.settings.static_store, &entries)
            .await?;
        Ok(entries.len())
    }

    /// Delete every store that is neither the current static nor the current dynamic store.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.set_phase(Phase::Activating).await;

        let current = [self.settings.static_store.as_str(), self.settings.dynamic_store.as_str()];
        let stale: Vec<String> = self
            .storage
            .list_names()
            .await?
            .into_iter()
            .filter(|name| !current.contains(&name.as_str()))
            .collect();

        let results = try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;
        let deleted: Vec<String> = stale
            .into_iter()
            .zip(results)
            .filter_map(|(name, existed)| existed.then_some(name))
            .collect();

        self.set_phase(Phase::Activated).await;
        tracing::info!(?deleted, "activation complete; claiming clients");

        Ok(ActivateReport { deleted, claimed: true })
    }

    /// Route a single request.
    ///
    /// Non-GET requests are never intercepted. Dynamic API requests always
    /// resolve (network, stored snapshot, or offline answer). Static requests
    /// fail only when the asset is not stored, the network is down, and the
    /// request is not a navigation with a stored shell page.
    pub async fn intercept(&self, request: &RequestDescriptor) -> Result<Outcome, Error> {
        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "passing through");
            return Ok(Outcome::PassThrough);
        }

        match request.classify(&self.settings.api_patterns) {
            RequestClass::DynamicApi => Ok(self.network_first(request).await),
            RequestClass::StaticAsset => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &RequestDescriptor) -> Outcome {
        let store = &self.settings.dynamic_store;

        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.remember(store, request, &response).await;
                }
                return Outcome::Resolved { response, source: ResponseSource::Network };
            }
            Err(err) => err,
        };

        tracing::warn!(url = %request.url, error = %err, "network failed; trying dynamic store");

        match self.storage.get(store, request).await {
            Ok(Some(response)) => {
                tracing::debug!(url = %request.url, "dynamic store hit");
                Outcome::Resolved { response, source: ResponseSource::Cache }
            }
            Ok(None) => {
                tracing::info!(url = %request.url, "no stored answer; serving offline notice");
                Outcome::Fallback(offline_response())
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "dynamic store lookup failed; serving offline notice");
                Outcome::Fallback(offline_response())
            }
        }
    }

    async fn cache_first(&self, request: &RequestDescriptor) -> Result<Outcome, Error> {
        let store = &self.settings.static_store;

        match self.storage.get(store, request).await {
            Ok(Some(response)) => {
                tracing::debug!(url = %request.url, "static store hit");
                return Ok(Outcome::Resolved { response, source: ResponseSource::Cache });
            }
            Ok(None) => tracing::debug!(url = %request.url, "static store miss"),
            Err(e) => tracing::warn!(url = %request.url, error = %e, "static store lookup failed"),
        }

        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.remember(store, request, &response).await;
                }
                return Ok(Outcome::Resolved { response, source: ResponseSource::Network });
            }
            Err(err) => err,
        };

        if request.is_navigation() {
            let shell = RequestDescriptor::get(self.settings.shell_url.clone());
            if let Ok(Some(page)) = self.storage.get(store, &shell).await {
                tracing::info!(url = %request.url, "network failed; serving application shell");
                return Ok(Outcome::Resolved { response: page, source: ResponseSource::Cache });
            }
        }

        tracing::warn!(url = %request.url, error = %err, "static asset unavailable");
        Err(Error::Offline(format!("{}: {err}", request.url)))
    }

    /// Write a copy of a response to a store. Failures are logged, never returned.
    async fn remember(&self, store: &str, request: &RequestDescriptor, response: &ResponseSnapshot) {
        match self.storage.put(store, request, response).await {
            Ok(()) => tracing::debug!(store, url = %request.url, bytes = response.body.len(), "stored response"),
            Err(e) => tracing::warn!(store, url = %request.url, error = %e, "failed to store response"),
        }
    }
}

impl<S: CacheStorage, N: Network> Clone for InterceptCache<S, N> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            network: Arc::clone(&self.network),
            settings: Arc::clone(&self.settings),
            phase: Arc::clone(&self.phase),
        }
    }
}
