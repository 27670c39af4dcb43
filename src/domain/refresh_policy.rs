//! Staleness thresholds and per-request refresh classification.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::return_mode::needs_mode_upgrade;
use super::series::AssetSeries;
use crate::ports::config_port::ConfigPort;

const HOUR_SECS: u64 = 60 * 60;

/// What a request should do with the cached entry for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Serve as-is.
    Fresh,
    /// Serve the cached entry and refresh without waiting.
    StaleBackground,
    /// Refresh first with a bounded wait; fall back to the cached entry.
    StaleBlocking,
    /// Nothing cached: fetch and wait, no fallback.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPolicy {
    /// Age past which the request path blocks on a refresh.
    pub fresh_window: Duration,
    /// Age past which a non-blocking refresh is started.
    pub background_trigger: Duration,
    /// Age past which data is refreshed regardless of request behaviour.
    pub hard_stale: Duration,
    /// Default bound on a blocking refresh; zero waits indefinitely.
    pub request_timeout: Duration,
    /// Period of the scheduled refresh sweep.
    pub interval: Duration,
    /// Delay before the first scheduled sweep.
    pub startup_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            fresh_window: Duration::from_secs(6 * HOUR_SECS),
            background_trigger: Duration::from_secs(2 * HOUR_SECS),
            hard_stale: Duration::from_secs(5 * 24 * HOUR_SECS),
            request_timeout: Duration::from_millis(12_000),
            interval: Duration::from_secs(6 * HOUR_SECS),
            startup_delay: Duration::from_secs(30),
        }
    }
}

impl RefreshPolicy {
    /// Reads `[refresh] *_ms` keys, keeping the default for anything missing or invalid.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            fresh_window: config.get_positive_millis("refresh", "fresh_window_ms", d.fresh_window),
            background_trigger: config.get_positive_millis(
                "refresh",
                "background_trigger_ms",
                d.background_trigger,
            ),
            hard_stale: config.get_positive_millis("refresh", "hard_stale_ms", d.hard_stale),
            request_timeout: config.get_positive_millis(
                "refresh",
                "request_timeout_ms",
                d.request_timeout,
            ),
            interval: config.get_positive_millis("refresh", "interval_ms", d.interval),
            startup_delay: config.get_positive_millis(
                "refresh",
                "startup_delay_ms",
                d.startup_delay,
            ),
        }
    }

    pub fn classify(
        &self,
        cached: Option<&AssetSeries>,
        now: DateTime<Utc>,
        forced: bool,
        block_on_stale: bool,
    ) -> Staleness {
        let Some(series) = cached else {
            return Staleness::Missing;
        };

        if forced {
            return if block_on_stale {
                Staleness::StaleBlocking
            } else {
                Staleness::StaleBackground
            };
        }

        if block_on_stale && age_of(series, now) > self.fresh_window {
            return Staleness::StaleBlocking;
        }

        if self.background_due(series, now, false) {
            Staleness::StaleBackground
        } else {
            Staleness::Fresh
        }
    }

    /// Older than `hard_stale`: refreshed at start-up regardless of request traffic.
    pub fn is_hard_stale(&self, series: &AssetSeries, now: DateTime<Utc>) -> bool {
        age_of(series, now) > self.hard_stale
    }

    /// Whether a cached entry warrants a fire-and-forget refresh.
    pub fn background_due(&self, series: &AssetSeries, now: DateTime<Utc>, forced: bool) -> bool {
        let age = age_of(series, now);
        forced
            || age > self.hard_stale
            || age > self.background_trigger
            || needs_mode_upgrade(series)
    }
}

fn age_of(series: &AssetSeries, now: DateTime<Utc>) -> Duration {
    series.age(now).to_std().unwrap_or_default()
}
