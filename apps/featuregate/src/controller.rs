//! # Controller
//!
//! Drives the core `Reconciler` from async code.
//!
//! - Each step runs on the blocking pool under a timeout
//! - Retryable failures (write conflicts, store errors, timeouts) are retried
//!   with exponential backoff up to `max_retries`
//! - A step that outlives its timeout is reported as timed out only once it
//!   has finished, so attempts for one name never overlap and a worker slot
//!   stays taken until the step is really gone
//! - A given Feature name is never reconciled twice at once; a request that
//!   arrives while it is in flight marks it dirty and it runs again after
//! - Different names run in parallel, bounded by `workers`

use featuregate_core::{FeatureGateError, ReconcileReport, Reconciler, ResourceStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Longest delay between two retries of the same name.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runtime knobs for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub workers: usize,
}

impl ControllerSettings {
    #[must_use]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            timeout: config.reconcile_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
            workers: config.workers.max(1),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::Config::default())
    }
}

/// One finished request.
pub type Completed = (String, Result<ReconcileReport, FeatureGateError>);

/// Async driver around a shared `Reconciler`.
pub struct Controller<S> {
    reconciler: Arc<Reconciler<S>>,
    settings: ControllerSettings,
    /// In-flight names, mapped to whether another request arrived meanwhile.
    active: Arc<Mutex<BTreeMap<String, bool>>>,
}

impl<S> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            settings: self.settings,
            active: Arc::clone(&self.active),
        }
    }
}

impl<S: ResourceStore + 'static> Controller<S> {
    pub fn new(store: S, settings: ControllerSettings) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(store)),
            settings,
            active: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    #[must_use]
    pub fn settings(&self) -> ControllerSettings {
        self.settings
    }

    /// Every name a full resync should visit.
    pub async fn resync_requests(&self) -> Result<Vec<String>, FeatureGateError> {
        let reconciler = Arc::clone(&self.reconciler);
        let names = tokio::task::spawn_blocking(move || reconciler.resync_requests())
            .await
            .map_err(|e| FeatureGateError::storage("list resync requests", e))??;
        Ok(names.into_iter().collect())
    }

    /// One reconcile step under the configured timeout, without retries.
    pub async fn reconcile_once(&self, name: &str) -> Result<ReconcileReport, FeatureGateError> {
        let reconciler = Arc::clone(&self.reconciler);
        let owned = name.to_string();
        let mut step = tokio::task::spawn_blocking(move || reconciler.reconcile(&owned));

        match tokio::time::timeout(self.settings.timeout, &mut step).await {
            Ok(joined) => joined.map_err(|e| FeatureGateError::storage(format!("reconcile {name}"), e))?,
            Err(_) => {
                // Blocking steps cannot be aborted; the next attempt must not overlap this one.
                warn!(feature = %name, timeout = ?self.settings.timeout, "reconcile step timed out, waiting for it to stop");
                if let Err(e) = step.await {
                    error!(feature = %name, error = %e, "timed out reconcile task failed");
                }
                Err(FeatureGateError::storage(
                    format!("reconcile {name}"),
                    format!("timed out after {:?}", self.settings.timeout),
                ))
            }
        }
    }

    /// Reconcile `name`, retrying retryable failures with backoff.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileReport, FeatureGateError> {
        let mut attempt: u32 = 0;
        loop {
            match self.reconcile_once(name).await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let delay = backoff(self.settings.backoff, attempt);
                    warn!(feature = %name, attempt, ?delay, error = %e, "requeue after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(feature = %name, error = %e, "reconcile failed");
                    return Err(e);
                }
            }
        }
    }

    /// Reconcile every name once (de-duplicated), at most `workers` at a time,
    /// and return the results sorted by name.
    pub async fn run_until_idle<I>(&self, names: I) -> Vec<Completed>
    where
        I: IntoIterator<Item = String>,
    {
        let unique: std::collections::BTreeSet<String> = names.into_iter().collect();
        let permits = Arc::new(Semaphore::new(self.settings.workers));
        let mut tasks = JoinSet::new();

        for name in unique {
            let controller = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = controller.reconcile(&name).await;
                (name, result)
            });
        }

        let mut completed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => completed.push(done),
                Err(e) => error!(error = %e, "reconcile task failed"),
            }
        }
        completed.sort_by(|a, b| a.0.cmp(&b.0));
        completed
    }

    /// Consume requests until `shutdown` flips to `true` or every sender is
    /// dropped, then wait for in-flight steps to finish.
    pub async fn run(&self, mut requests: mpsc::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.settings.workers));
        let mut tasks = JoinSet::new();
        info!(workers = self.settings.workers, "controller started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                request = requests.recv() => {
                    let Some(name) = request else { break };
                    if !self.claim(&name) {
                        debug!(feature = %name, "already in flight, marked dirty");
                        continue;
                    }
                    let controller = self.clone();
                    let permits = Arc::clone(&permits);
                    tasks.spawn(async move {
                        let _permit = permits.acquire_owned().await;
                        controller.drain(name).await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "reconcile task failed");
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "controller stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "reconcile task failed");
            }
        }
    }

    /// Reconcile `name` until no request arrived during the last step.
    async fn drain(&self, name: String) {
        loop {
            // Failures are logged inside `reconcile`; the next request retries.
            let _ = self.reconcile(&name).await;
            if !self.release(&name) {
                break;
            }
        }
    }

    /// Mark `name` in flight. Returns `false` if it already was (it is then
    /// marked dirty instead).
    fn claim(&self, name: &str) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get_mut(name) {
            Some(dirty) => {
                *dirty = true;
                false
            }
            None => {
                active.insert(name.to_string(), false);
                true
            }
        }
    }

    /// Finish one step for `name`. Returns `true` if it must run again.
    fn release(&self, name: &str) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get_mut(name) {
            Some(dirty) if *dirty => {
                *dirty = false;
                true
            }
            _ => {
                active.remove(name);
                false
            }
        }
    }
}

/// `base * 2^attempt`, capped at `MAX_BACKOFF`.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}
