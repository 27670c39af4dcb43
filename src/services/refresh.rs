//! Refresh orchestration: staleness handling on the request path, single-flight
//! refresh jobs per cache key, the periodic sweep and start-up warm-up.
//!
//! A refresh job runs as its own tokio task. Callers hold a shared handle to
//! its outcome, so a caller that stops waiting (timeout, dropped request) never
//! cancels the fetch; the store is still updated when it completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::asset::{AssetCatalogue, AssetProfile};
use crate::domain::error::DcaError;
use crate::domain::refresh_policy::{RefreshPolicy, Staleness};
use crate::domain::return_mode::{
    alias_for_mode, backfill_total_return, estimate_total_return, needs_mode_upgrade,
};
use crate::domain::series::{AssetSeries, CacheKey, ReturnMode};
use crate::services::fetcher::SourceFetcher;
use crate::services::store::{PutOutcome, SeriesStore};

type JobOutcome = Result<AssetSeries, DcaError>;
type RefreshJob = Shared<BoxFuture<'static, JobOutcome>>;

/// Request-path behaviour for [`RefreshOrchestrator::get_series`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GetSeriesOptions {
    /// Wait for a refresh of an entry older than the fresh window.
    pub block_on_stale: bool,
    /// Bound on that wait; `None` uses the policy default, zero waits indefinitely.
    pub refresh_timeout: Option<Duration>,
}

impl Default for GetSeriesOptions {
    fn default() -> Self {
        Self {
            block_on_stale: true,
            refresh_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub failed: usize,
}

struct Inner {
    catalogue: AssetCatalogue,
    fetcher: SourceFetcher,
    store: SeriesStore,
    policy: RefreshPolicy,
    jobs: Mutex<HashMap<CacheKey, (u64, RefreshJob)>>,
    next_job_id: AtomicU64,
}

#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
}

impl RefreshOrchestrator {
    pub fn new(
        catalogue: AssetCatalogue,
        fetcher: SourceFetcher,
        store: SeriesStore,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalogue,
                fetcher,
                store,
                policy,
                jobs: Mutex::new(HashMap::new()),
                next_job_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn catalogue(&self) -> &AssetCatalogue {
        &self.inner.catalogue
    }

    pub fn store(&self) -> &SeriesStore {
        &self.inner.store
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.inner.policy
    }

    /// Whether a refresh job for `key` is currently in flight.
    pub fn is_refreshing(&self, key: &CacheKey) -> bool {
        self.inner.jobs().contains_key(key)
    }

    /// Refresh one key and wait for the outcome, joining any job already in flight.
    pub async fn refresh(&self, asset_id: &str, mode: ReturnMode) -> JobOutcome {
        self.inner.catalogue.get(asset_id)?;
        Inner::job(&self.inner, CacheKey::new(asset_id, mode)).await
    }

    /// The series for `(asset_id, mode)`.
    ///
    /// Fails only when nothing is cached and every provider fails; any cached
    /// entry is served when a blocking refresh fails or times out.
    pub async fn get_series(
        &self,
        asset_id: &str,
        mode: ReturnMode,
        options: GetSeriesOptions,
    ) -> JobOutcome {
        let inner = &self.inner;
        let asset = inner.catalogue.get(asset_id)?;
        let key = CacheKey::new(asset_id, mode);

        let cached = inner.cached_or_loaded(asset, &key).await;

        if cached.is_none() && mode == ReturnMode::TotalReturn {
            let price_key = CacheKey::new(asset_id, ReturnMode::Price);
            if let Some(price) = inner.store.get(&price_key).await {
                let alias = alias_for_mode(&price, mode, &asset.dividend_yields)?;
                info!(key = %key, "serving estimate from price series while total return loads");
                inner.store.insert_transient(alias.clone()).await;
                self.refresh_in_background(&key);
                return Ok(alias);
            }
        }

        let now = Utc::now();
        let forced = cached
            .as_ref()
            .is_some_and(|s| asset.requires_history_refresh(s));
        let state = inner
            .policy
            .classify(cached.as_ref(), now, forced, options.block_on_stale);
        debug!(key = %key, ?state, forced, "classified cached series");

        let Some(cached) = cached else {
            return Inner::job(inner, key).await;
        };

        match state {
            Staleness::Fresh => Ok(cached),
            Staleness::StaleBackground | Staleness::Missing => {
                self.refresh_in_background(&key);
                Ok(cached)
            }
            Staleness::StaleBlocking => {
                let timeout = options
                    .refresh_timeout
                    .unwrap_or(inner.policy.request_timeout);
                match self.wait_bounded(&key, timeout).await {
                    Ok(fresh) => Ok(fresh),
                    Err(e) => {
                        warn!(key = %key, error = %e, "request-path refresh failed, serving cached series");
                        if !forced && inner.policy.background_due(&cached, now, false) {
                            self.refresh_in_background(&key);
                        }
                        Ok(cached)
                    }
                }
            }
        }
    }

    async fn wait_bounded(&self, key: &CacheKey, timeout: Duration) -> JobOutcome {
        let job = Inner::job(&self.inner, key.clone());
        if timeout.is_zero() {
            return job.await;
        }
        tokio::time::timeout(timeout, job)
            .await
            .map_err(|_| DcaError::Timeout {
                what: format!("refresh of {key}"),
                millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }

    /// Start (or join) a refresh without waiting for it.
    pub fn refresh_in_background(&self, key: &CacheKey) {
        let _job = Inner::job(&self.inner, key.clone());
    }

    /// Refresh every (asset, mode) pair concurrently.
    pub async fn refresh_all(&self, reason: &str) -> SweepReport {
        let keys = self.inner.catalogue.keys();
        let jobs: Vec<RefreshJob> = keys
            .iter()
            .map(|key| Inner::job(&self.inner, key.clone()))
            .collect();
        let total = jobs.len();
        let failed = join_all(jobs)
            .await
            .iter()
            .filter(|outcome| outcome.is_err())
            .count();

        if failed > 0 {
            warn!(reason, failed, total, "refresh sweep finished with failures");
        } else {
            info!(reason, total, "refresh sweep completed");
        }
        SweepReport {
            completed: total - failed,
            failed,
        }
    }

    /// First sweep after the start-up delay, then one per interval.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let this = self.clone();
        let startup_delay = self.inner.policy.startup_delay;
        let interval = self.inner.policy.interval;
        tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            this.refresh_all("startup").await;

            let first_tick = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.refresh_all("interval").await;
            }
        })
    }

    /// Loads every persisted key into memory and starts background refreshes
    /// for entries that are hard-stale, truncated or awaiting an upgrade.
    /// Returns the number of keys loaded.
    pub async fn warm_up(&self) -> usize {
        let inner = &self.inner;
        let now = Utc::now();
        let mut loaded = 0;

        for key in inner.catalogue.keys() {
            let Ok(asset) = inner.catalogue.get(&key.asset_id) else {
                continue;
            };
            let Some(series) = inner.load_reconciled(asset, &key).await else {
                continue;
            };
            loaded += 1;

            if inner.policy.is_hard_stale(&series, now)
                || asset.requires_history_refresh(&series)
                || needs_mode_upgrade(&series)
            {
                debug!(key = %key, "warm-up scheduling refresh");
                self.refresh_in_background(&key);
            }
        }

        info!(loaded, "warmed series cache");
        loaded
    }
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<CacheKey, (u64, RefreshJob)>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The in-flight job for `key`, or a newly spawned one.
    fn job(this: &Arc<Self>, key: CacheKey) -> RefreshJob {
        let mut jobs = this.jobs();
        if let Some((_, job)) = jobs.get(&key) {
            debug!(key = %key, "joining in-flight refresh");
            return job.clone();
        }

        let id = this.next_job_id.fetch_add(1, Ordering::Relaxed);
        let task_inner = Arc::clone(this);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = task_inner.run_job(&task_key).await;
            task_inner.finish(&task_key, id);
            outcome
        });

        let abort_key = key.to_string();
        let job = async move {
            handle.await.unwrap_or_else(|e| {
                Err(DcaError::RefreshAborted {
                    key: abort_key,
                    reason: e.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        jobs.insert(key, (id, job.clone()));
        job
    }

    fn finish(&self, key: &CacheKey, id: u64) {
        let mut jobs = self.jobs();
        if jobs.get(key).is_some_and(|(current, _)| *current == id) {
            jobs.remove(key);
        }
    }

    async fn run_job(&self, key: &CacheKey) -> JobOutcome {
        let outcome = self.fetch_and_store(key).await;
        if let Err(e) = &outcome {
            warn!(key = %key, error = %e, "refresh failed");
        }
        outcome
    }

    async fn fetch_and_store(&self, key: &CacheKey) -> JobOutcome {
        let asset = self.catalogue.get(&key.asset_id)?;
        let fetched = self.fetcher.fetch(asset, key.mode).await?;
        let resolved = self.resolve_fetched(asset, fetched).await?;

        match self.store.put(resolved.clone()).await? {
            PutOutcome::Accepted => {
                info!(
                    key = %key,
                    provider = %resolved.meta.provider,
                    resolved = %resolved.resolved_return_mode(),
                    earliest = %resolved.earliest_date(),
                    latest = %resolved.latest_date(),
                    "series updated"
                );
                Ok(resolved)
            }
            PutOutcome::Rejected { kept } => Ok(kept),
        }
    }

    /// Bring a fresh fetch to the requested mode: estimate total return from
    /// price data, or backfill a short true total-return history.
    async fn resolve_fetched(&self, asset: &AssetProfile, fetched: AssetSeries) -> JobOutcome {
        if fetched.meta.requested_return_mode != ReturnMode::TotalReturn {
            return Ok(fetched);
        }
        if fetched.resolved_return_mode() != ReturnMode::TotalReturn {
            return estimate_total_return(&fetched, &asset.dividend_yields);
        }
        self.backfill(asset, fetched, true).await
    }

    async fn backfill(
        &self,
        asset: &AssetProfile,
        total: AssetSeries,
        allow_remote: bool,
    ) -> JobOutcome {
        match self.price_history(asset, allow_remote).await {
            Some(price) => backfill_total_return(&total, &price, &asset.dividend_yields),
            None => Ok(total),
        }
    }

    /// Price history for backfill: memory, then disk, then (inside refresh
    /// jobs only) upstream.
    async fn price_history(
        &self,
        asset: &AssetProfile,
        allow_remote: bool,
    ) -> Option<AssetSeries> {
        let key = CacheKey::new(asset.id.clone(), ReturnMode::Price);
        if let Some(series) = self.store.get(&key).await {
            return Some(series);
        }
        if !allow_remote {
            return None;
        }
        match self.fetcher.fetch(asset, ReturnMode::Price).await {
            Ok(series) => Some(series),
            Err(e) => {
                debug!(asset = %asset.id, error = %e, "no price history for backfill");
                None
            }
        }
    }

    /// Re-apply aliasing and backfill to a total-return entry. Entries that
    /// change are persisted again.
    async fn reconcile(&self, asset: &AssetProfile, series: AssetSeries) -> AssetSeries {
        if series.meta.requested_return_mode != ReturnMode::TotalReturn {
            return series;
        }

        let reconciled = if series.resolved_return_mode() != ReturnMode::TotalReturn {
            alias_for_mode(&series, ReturnMode::TotalReturn, &asset.dividend_yields)
        } else {
            self.backfill(asset, series.clone(), false).await
        };

        match reconciled {
            Ok(updated) if updated != series => {
                debug!(
                    key = %updated.key(),
                    earliest = %updated.earliest_date(),
                    "reconciled total-return series"
                );
                match self
                    .store
                    .replace_derived(updated.clone(), series.meta.fetched_at)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        return self
                            .store
                            .cached(&updated.key())
                            .await
                            .unwrap_or(updated);
                    }
                    Err(e) => {
                        warn!(
                            key = %updated.key(),
                            error = %e,
                            "failed to persist reconciled series"
                        );
                    }
                }
                updated
            }
            Ok(_) => series,
            Err(e) => {
                warn!(key = %series.key(), error = %e, "could not reconcile series");
                series
            }
        }
    }

    async fn load_reconciled(&self, asset: &AssetProfile, key: &CacheKey) -> Option<AssetSeries> {
        let series = self.store.load_persisted(key).await?;
        let reconciled = self.reconcile(asset, series).await;
        self.store.insert_transient(reconciled.clone()).await;
        Some(reconciled)
    }

    async fn cached_or_loaded(
        &self,
        asset: &AssetProfile,
        key: &CacheKey,
    ) -> Option<AssetSeries> {
        match self.store.cached(key).await {
            Some(series) => Some(self.reconcile(asset, series).await),
            None => self.load_reconciled(asset, key).await,
        }
    }
}
