//! Cache lifecycle manager.
//!
//! Owns the versioned partitions and mediates every request the page makes:
//!
//! - **Install** creates the current version's partitions and precaches the
//!   critical documents. One failed asset never aborts the others.
//! - **Activate** deletes every partition whose version token is not the
//!   current one. Interception waits until activation has finished.
//! - **Intercept** classifies a request and serves it cache-first (static),
//!   network-first (API) or stale-while-revalidate (images); anything else
//!   passes through.
//!
//! If install or activation cannot reach the store, the manager degrades to
//! pass-through instead of blocking the page.

pub mod classify;
pub mod response;
pub mod revalidate;
pub mod strategy;


use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use swcache_core::cache::hash::compute_cache_key;
use swcache_core::{AppConfig, CacheDb, Error, Partition, PartitionName, PartitionPolicy, Purpose};
use tokio::sync::watch;
use tokio::task::JoinSet;

pub use classify::{Classifier, Strategy};
pub use response::{ResponseSource, ServedResponse};
pub use revalidate::Revalidations;

use crate::fetch::{Fetcher, resolve};
use crate::request::InterceptedRequest;

/// Settings the manager needs, usually derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Version token of the live partitions.
    pub version: String,
    /// Origin whose requests are in scope.
    pub origin: Url,
    pub api_prefix: String,
    pub precache: Vec<String>,
    pub offline_page: String,
    /// Bound on the network leg of network-first.
    pub api_timeout: Duration,
    /// Bound on an image fetch when nothing is cached yet.
    pub fetch_timeout: Duration,
    pub max_api_entries: usize,
    pub image_max_age: Duration,
}

impl ManagerConfig {
    /// Defaults from `AppConfig::default()` for the given version and origin.
    pub fn new(version: impl Into<String>, origin: Url) -> Self {
        let defaults = AppConfig::default();
        Self {
            version: version.into(),
            origin,
            api_prefix: defaults.api_prefix.clone(),
            precache: defaults.precache.clone(),
            offline_page: defaults.offline_page.clone(),
            api_timeout: defaults.api_timeout(),
            fetch_timeout: defaults.timeout(),
            max_api_entries: defaults.max_api_entries,
            image_max_age: defaults.image_max_age(),
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        Ok(Self {
            version: config.cache_version.clone(),
            origin,
            api_prefix: config.api_prefix.clone(),
            precache: config.precache.clone(),
            offline_page: config.offline_page.clone(),
            api_timeout: config.api_timeout(),
            fetch_timeout: config.timeout(),
            max_api_entries: config.max_api_entries,
            image_max_age: config.image_max_age(),
        })
    }

    /// Eviction policy of each partition.
    pub fn policy(&self, purpose: Purpose) -> PartitionPolicy {
        match purpose {
            Purpose::Static => PartitionPolicy::unbounded(),
            Purpose::Api => PartitionPolicy::unbounded().with_max_entries(self.max_api_entries),
            Purpose::Images => PartitionPolicy::unbounded().with_max_age(self.image_max_age),
        }
    }
}

/// Lifecycle state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Store unavailable; every request passes through.
    Degraded,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Pending => "pending",
            Lifecycle::Installing => "installing",
            Lifecycle::Installed => "installed",
            Lifecycle::Activating => "activating",
            Lifecycle::Activated => "activated",
            Lifecycle::Degraded => "degraded",
        }
    }

    pub fn is_serving(&self) -> bool {
        matches!(self, Lifecycle::Activated | Lifecycle::Degraded)
    }
}

/// Outcome of `install`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Precache paths stored, sorted.
    pub stored: Vec<String>,
    /// Precache paths that could not be stored, with the reason, sorted by path.
    pub failed: Vec<(String, String)>,
}

/// The cache lifecycle manager.
pub struct CacheManager {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    config: ManagerConfig,
    classifier: Classifier,
    offline_key: String,
    state: watch::Sender<Lifecycle>,
    revalidations: Revalidations,
}

impl CacheManager {
    /// Create a manager in the `Pending` state.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUrl` if the offline page does not resolve against the origin.
    pub fn new(db: CacheDb, fetcher: Arc<dyn Fetcher>, config: ManagerConfig) -> Result<Self, Error> {
        let offline_url =
            resolve(&config.origin, &config.offline_page).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let offline_key = compute_cache_key("GET", offline_url.as_str(), "");
        let classifier = Classifier::new(config.origin.clone(), config.api_prefix.clone(), &config.precache);
        let (state, _) = watch::channel(Lifecycle::Pending);

        Ok(Self { db, fetcher, config, classifier, offline_key, state, revalidations: Revalidations::new() })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        *self.state.borrow()
    }

    fn set_state(&self, state: Lifecycle) {
        self.state.send_replace(state);
    }

    pub fn partition_name(&self, purpose: Purpose) -> PartitionName {
        PartitionName::new(purpose, self.config.version.clone())
    }

    /// Handle to the current version's partition for `purpose`.
    pub fn partition(&self, purpose: Purpose) -> Partition {
        Partition::new(self.db.clone(), self.partition_name(purpose), self.config.policy(purpose))
    }

    async fn ensure_partitions(&self) -> Result<(), Error> {
        for purpose in Purpose::ALL {
            if self.db.ensure_partition(&self.partition_name(purpose)).await? {
                tracing::debug!(partition = %self.partition_name(purpose), "created partition");
            }
        }
        Ok(())
    }

    /// Create this version's partitions and precache the critical documents.
    ///
    /// # Errors
    ///
    /// Only when the store is unavailable. Individual asset failures are
    /// recorded in the report.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.set_state(Lifecycle::Installing);
        self.ensure_partitions().await?;

        let partition = self.partition(Purpose::Static);
        let mut tasks = JoinSet::new();
        for path in &self.config.precache {
            let fetcher = Arc::clone(&self.fetcher);
            let partition = partition.clone();
            let origin = self.config.origin.clone();
            let path = path.clone();
            tasks.spawn(async move {
                let outcome = precache_one(fetcher.as_ref(), &partition, &origin, &path).await;
                (path, outcome)
            });
        }

        let mut report = InstallReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, Ok(()))) => report.stored.push(path),
                Ok((path, Err(e))) => {
                    tracing::warn!(path = %path, error = %e, "precache failed, skipping");
                    report.failed.push((path, e.to_string()));
                }
                Err(e) => tracing::warn!(error = %e, "precache task failed"),
            }
        }
        report.stored.sort();
        report.failed.sort();

        self.set_state(Lifecycle::Installed);
        tracing::info!(
            version = %self.config.version,
            stored = report.stored.len(),
            failed = report.failed.len(),
            "installed"
        );
        Ok(report)
    }

    /// Delete every partition that does not belong to the current version.
    ///
    /// Returns the names of the deleted partitions. Afterwards exactly one
    /// partition per purpose exists.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        self.set_state(Lifecycle::Activating);
        self.ensure_partitions().await?;

        let mut deleted = Vec::new();
        for record in self.db.list_partitions().await? {
            let current = matches!(record.parsed_name(), Ok(name) if name.version == self.config.version);
            if !current && self.db.delete_partition(&record.name).await? {
                tracing::info!(partition = %record.name, "deleted stale partition");
                deleted.push(record.name);
            }
        }

        self.set_state(Lifecycle::Activated);
        tracing::info!(version = %self.config.version, deleted = deleted.len(), "activated");
        Ok(deleted)
    }

    /// Run install then activate. On failure the manager degrades to
    /// pass-through; the resulting state is returned either way.
    pub async fn start(&self) -> Lifecycle {
        let result = match self.install().await {
            Ok(_) => self.activate().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "cache unavailable, passing all requests through");
            self.set_state(Lifecycle::Degraded);
        }
        self.state()
    }

    /// Wait until the manager may serve requests.
    pub async fn ready(&self) -> Result<Lifecycle, Error> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(Lifecycle::is_serving)
            .await
            .map_err(|e| Error::NotActivated(e.to_string()))?;
        Ok(*state)
    }

    /// Serve one request through its strategy.
    ///
    /// Waits for activation first.
    ///
    /// # Errors
    ///
    /// The network error, when neither the network nor the cache can answer.
    pub async fn intercept(&self, request: &InterceptedRequest) -> Result<ServedResponse, Error> {
        if self.ready().await? == Lifecycle::Degraded {
            return strategy::passthrough(self.fetcher.as_ref(), request).await;
        }

        let chosen = self.classifier.classify(request);
        tracing::debug!(method = %request.method, url = %request.url, strategy = ?chosen, "intercept");

        match chosen {
            Strategy::CacheFirst => {
                strategy::cache_first(
                    self.fetcher.as_ref(),
                    &self.partition(Purpose::Static),
                    request,
                    &self.offline_key,
                )
                .await
            }
            Strategy::NetworkFirst => {
                strategy::network_first(
                    self.fetcher.as_ref(),
                    &self.partition(Purpose::Api),
                    request,
                    self.config.api_timeout,
                )
                .await
            }
            Strategy::StaleWhileRevalidate => {
                strategy::stale_while_revalidate(
                    &self.fetcher,
                    &self.partition(Purpose::Images),
                    request,
                    self.config.fetch_timeout,
                    &self.revalidations,
                )
                .await
            }
            Strategy::Passthrough => strategy::passthrough(self.fetcher.as_ref(), request).await,
        }
    }

    /// Apply every partition's policy now.
    pub async fn sweep(&self) -> Result<u64, Error> {
        self.sweep_at(Utc::now()).await
    }

    /// Apply every partition's policy as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut evicted = 0;
        for purpose in Purpose::ALL {
            evicted += self.partition(purpose).enforce_at(now).await?;
        }
        Ok(evicted)
    }

    /// Wait for all background refreshes to finish.
    pub async fn settle(&self) -> usize {
        self.revalidations.settle().await
    }
}

async fn precache_one(fetcher: &dyn Fetcher, partition: &Partition, origin: &Url, path: &str) -> Result<(), Error> {
    let url = resolve(origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
    let request = InterceptedRequest::from_url(reqwest::Method::GET, url);
    let response = fetcher.fetch(&request).await?;
    if !response.status.is_success() {
        return Err(Error::HttpError(format!("status {}", response.status.as_u16())));
    }
    partition.put(&response.to_cached("GET")).await?;
    Ok(())
}
