//! Authoritative series per cache key: an in-memory map backed by a
//! [`SeriesRepository`], guarded against history regressions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::error::DcaError;
use crate::domain::series::{AssetSeries, CacheKey, ReturnMode};
use crate::ports::series_port::SeriesRepository;

/// Rejects an update whose history is suspiciously shorter than the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionGuard {
    pub min_retained_ratio: f64,
}

impl Default for RegressionGuard {
    fn default() -> Self {
        Self {
            min_retained_ratio: Self::DEFAULT_MIN_RETAINED_RATIO,
        }
    }
}

impl RegressionGuard {
    pub const DEFAULT_MIN_RETAINED_RATIO: f64 = 0.85;

    pub fn new(min_retained_ratio: f64) -> Self {
        Self { min_retained_ratio }
    }

    /// Only a baseline of the same kind is compared: same resolved mode, same
    /// estimated flag, and not a price series standing in for total return.
    pub fn rejects(&self, baseline: &AssetSeries, incoming: &AssetSeries) -> bool {
        let baseline_is_alias = baseline.meta.requested_return_mode == ReturnMode::TotalReturn
            && baseline.resolved_return_mode() != ReturnMode::TotalReturn;
        let comparable = !baseline_is_alias && baseline.meta.basis == incoming.meta.basis;

        comparable
            && incoming.earliest_date() > baseline.earliest_date()
            && (incoming.len() as f64) < baseline.len() as f64 * self.min_retained_ratio
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    Accepted,
    /// The incoming series was dropped; `kept` is the baseline still stored.
    Rejected { kept: AssetSeries },
}

pub struct SeriesStore {
    entries: RwLock<HashMap<CacheKey, AssetSeries>>,
    repository: Arc<dyn SeriesRepository>,
    guard: RegressionGuard,
}

impl SeriesStore {
    pub fn new(repository: Arc<dyn SeriesRepository>) -> Self {
        Self::with_guard(repository, RegressionGuard::default())
    }

    pub fn with_guard(repository: Arc<dyn SeriesRepository>, guard: RegressionGuard) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            repository,
            guard,
        }
    }

    /// In-memory entry only.
    pub async fn cached(&self, key: &CacheKey) -> Option<AssetSeries> {
        self.entries.read().await.get(key).cloned()
    }

    /// Persisted entry, bypassing memory. Does not populate memory.
    pub async fn load_persisted(&self, key: &CacheKey) -> Option<AssetSeries> {
        self.repository.load(key).await
    }

    /// In-memory entry, else the persisted one (which is then kept in memory).
    pub async fn get(&self, key: &CacheKey) -> Option<AssetSeries> {
        if let Some(series) = self.cached(key).await {
            return Some(series);
        }
        let loaded = self.repository.load(key).await?;
        debug!(key = %key, rows = loaded.len(), "warmed series from disk");
        self.entries
            .write()
            .await
            .insert(key.clone(), loaded.clone());
        Some(loaded)
    }

    /// Stores `series` under its key unless the regression guard rejects it.
    /// Accepted series are persisted before they become visible in memory.
    pub async fn put(&self, series: AssetSeries) -> Result<PutOutcome, DcaError> {
        let key = series.key();
        if let Some(baseline) = self.get(&key).await {
            if self.guard.rejects(&baseline, &series) {
                warn!(
                    key = %key,
                    incoming_rows = series.len(),
                    incoming_earliest = %series.earliest_date(),
                    rows = baseline.len(),
                    earliest = %baseline.earliest_date(),
                    latest = %baseline.latest_date(),
                    "update would shorten known history, keeping stored series"
                );
                return Ok(PutOutcome::Rejected { kept: baseline });
            }
        }

        self.replace(series).await?;
        Ok(PutOutcome::Accepted)
    }

    /// Persist and publish without the regression check.
    pub async fn replace(&self, series: AssetSeries) -> Result<(), DcaError> {
        self.repository.save(&series).await?;
        self.entries.write().await.insert(series.key(), series);
        Ok(())
    }

    /// Publishes a series derived from an entry fetched at `seen`, unless a
    /// newer fetch was stored meanwhile. Returns whether it was published.
    /// A failed save still publishes in memory and reports the error.
    pub async fn replace_derived(
        &self,
        series: AssetSeries,
        seen: DateTime<Utc>,
    ) -> Result<bool, DcaError> {
        let mut entries = self.entries.write().await;
        let key = series.key();
        if entries
            .get(&key)
            .is_some_and(|current| current.meta.fetched_at > seen)
        {
            debug!(key = %key, "newer series stored meanwhile, dropping derived copy");
            return Ok(false);
        }
        let saved = self.repository.save(&series).await;
        entries.insert(key, series);
        saved.map(|()| true)
    }

    /// Publish in memory only. An entry from a newer fetch is left in place.
    pub async fn insert_transient(&self, series: AssetSeries) {
        let mut entries = self.entries.write().await;
        let key = series.key();
        if entries
            .get(&key)
            .is_some_and(|current| current.meta.fetched_at > series.meta.fetched_at)
        {
            return;
        }
        entries.insert(key, series);
    }
}
