//! On-disk series cache: one compact JSON document per cache key.
//!
//! Price series live in `{asset}.json`, total-return series in
//! `{asset}.total_return.json`. Rows are stored as `[date, close]` pairs with
//! the close rounded to six decimals.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::error::DcaError;
use crate::domain::series::{
    AssetSeries, CacheKey, PriceRow, Provenance, ReturnMode, SeriesBasis, SeriesMeta,
};
use crate::ports::series_port::SeriesRepository;

const CLOSE_SCALE: f64 = 1_000_000.0;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSeriesDocument {
    #[serde(default)]
    asset_id: String,
    #[serde(default)]
    asset_name: String,
    #[serde(default)]
    symbol: String,
    requested_return_mode: Option<String>,
    resolved_return_mode: Option<String>,
    #[serde(default)]
    is_proxy: bool,
    #[serde(default)]
    is_estimated: bool,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    source_url: String,
    fetched_at: Option<String>,
    earliest_date: Option<NaiveDate>,
    latest_date: Option<NaiveDate>,
    rows: Vec<(String, f64)>,
}

impl CachedSeriesDocument {
    fn from_series(series: &AssetSeries) -> Self {
        let meta = &series.meta;
        Self {
            asset_id: meta.asset_id.clone(),
            asset_name: meta.asset_name.clone(),
            symbol: meta.symbol.clone(),
            requested_return_mode: Some(meta.requested_return_mode.as_str().to_string()),
            resolved_return_mode: Some(meta.basis.mode.as_str().to_string()),
            is_proxy: meta.is_proxy,
            is_estimated: meta.basis.is_estimated(),
            provider: meta.provider.clone(),
            source_url: meta.source_url.clone(),
            fetched_at: Some(meta.fetched_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            earliest_date: Some(series.earliest_date()),
            latest_date: Some(series.latest_date()),
            rows: series
                .rows()
                .iter()
                .map(|r| {
                    (
                        r.date.format("%Y-%m-%d").to_string(),
                        (r.close * CLOSE_SCALE).round() / CLOSE_SCALE,
                    )
                })
                .collect(),
        }
    }

    fn into_series(self, key: &CacheKey) -> Result<AssetSeries, DcaError> {
        // unrecognised modes read as total return
        let requested = self
            .requested_return_mode
            .as_deref()
            .map_or(key.mode, |raw| ReturnMode::from_request(Some(raw)));
        let resolved = self
            .resolved_return_mode
            .as_deref()
            .map_or(requested, |raw| ReturnMode::from_request(Some(raw)));
        let provenance = if self.is_estimated {
            Provenance::Estimated
        } else {
            Provenance::Observed
        };
        // unreadable timestamps count as infinitely old
        let fetched_at = self
            .fetched_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let meta = SeriesMeta {
            asset_id: key.asset_id.clone(),
            asset_name: if self.asset_name.is_empty() {
                key.asset_id.clone()
            } else {
                self.asset_name
            },
            symbol: self.symbol,
            requested_return_mode: requested,
            basis: SeriesBasis {
                mode: resolved,
                provenance,
            },
            is_proxy: self.is_proxy,
            provider: if self.provider.is_empty() {
                "Local cache".to_string()
            } else {
                self.provider
            },
            source_url: self.source_url,
            fetched_at,
        };

        let rows = self.rows.into_iter().filter_map(|(date, close)| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .map(|d| PriceRow::new(d, close))
        });
        AssetSeries::new(meta, rows)
    }
}

pub struct JsonStoreAdapter {
    dir: PathBuf,
}

impl JsonStoreAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let file = match key.mode {
            ReturnMode::Price => format!("{}.json", key.asset_id),
            ReturnMode::TotalReturn => format!("{}.total_return.json", key.asset_id),
        };
        self.dir.join(file)
    }
}

fn storage_error(path: &Path, err: impl ToString) -> DcaError {
    DcaError::Storage {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl SeriesRepository for JsonStoreAdapter {
    async fn load(&self, key: &CacheKey) -> Option<AssetSeries> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = %key, path = %path.display(), "no persisted series");
                return None;
            }
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "failed to read persisted series");
                return None;
            }
        };

        let parsed = serde_json::from_slice::<CachedSeriesDocument>(&bytes)
            .map_err(DcaError::from)
            .and_then(|doc| doc.into_series(key));
        match parsed {
            Ok(series) => Some(series),
            Err(e) => {
                warn!(key = %key, path = %path.display(), error = %e, "ignoring unreadable persisted series");
                None
            }
        }
    }

    async fn save(&self, series: &AssetSeries) -> Result<(), DcaError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, e))?;

        let path = self.path_for(&series.key());
        let body = serde_json::to_vec(&CachedSeriesDocument::from_series(series))?;

        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| storage_error(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| storage_error(&path, e))?;

        debug!(key = %series.key(), path = %path.display(), rows = series.len(), "persisted series");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample(mode: ReturnMode) -> AssetSeries {
        AssetSeries::new(
            SeriesMeta {
                asset_id: "sp500".into(),
                asset_name: "S&P 500".into(),
                symbol: "SPY.US".into(),
                requested_return_mode: mode,
                basis: SeriesBasis::ESTIMATED_TOTAL_RETURN,
                is_proxy: true,
                provider: "FRED + DividendModel".into(),
                source_url: "https://fred.example/SP500".into(),
                fetched_at: DateTime::parse_from_rfc3339("2025-03-04T05:06:07.123Z")
                    .unwrap()
                    .with_timezone(&Utc),
            },
            vec![
                PriceRow::new(d(2020, 1, 2), 3257.8512345678),
                PriceRow::new(d(2020, 1, 3), 3234.85),
            ],
        )
        .unwrap()
    }

    #[test]
    fn file_names_follow_mode() {
        let store = JsonStoreAdapter::new("/cache");
        assert_eq!(
            store.path_for(&CacheKey::new("sp500", ReturnMode::Price)),
            PathBuf::from("/cache/sp500.json")
        );
        assert_eq!(
            store.path_for(&CacheKey::new("nasdaq100", ReturnMode::TotalReturn)),
            PathBuf::from("/cache/nasdaq100.total_return.json")
        );
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path().join("nested"));
        let series = sample(ReturnMode::TotalReturn);

        store.save(&series).await.unwrap();
        let loaded = store.load(&series.key()).await.unwrap();

        assert_eq!(loaded.meta, series.meta);
        assert_eq!(loaded.earliest_date(), series.earliest_date());
        assert_eq!(loaded.latest_date(), series.latest_date());
        assert!((loaded.rows()[0].close - 3257.851235).abs() < 1e-9);
    }

    #[tokio::test]
    async fn document_uses_compact_pairs() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path());
        let series = sample(ReturnMode::TotalReturn);
        store.save(&series).await.unwrap();

        let text = std::fs::read_to_string(store.path_for(&series.key())).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["resolvedReturnMode"], "total_return");
        assert_eq!(json["isEstimated"], true);
        assert_eq!(json["earliestDate"], "2020-01-02");
        assert_eq!(json["rows"][1][0], "2020-01-03");
        assert_eq!(json["rows"][1][1], 3234.85);
    }

    #[tokio::test]
    async fn missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path());
        assert!(store
            .load(&CacheKey::new("sp500", ReturnMode::Price))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path());
        let key = CacheKey::new("sp500", ReturnMode::Price);
        std::fs::write(store.path_for(&key), "{not json").unwrap();
        assert!(store.load(&key).await.is_none());
    }

    #[tokio::test]
    async fn sparse_document_gets_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path());
        let key = CacheKey::new("nasdaq100", ReturnMode::Price);
        std::fs::write(
            store.path_for(&key),
            r#"{"fetchedAt":"yesterday","rows":[["2021-05-03",13500.5],["bad",1.0]]}"#,
        )
        .unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded.meta.requested_return_mode, ReturnMode::Price);
        assert_eq!(loaded.meta.basis, SeriesBasis::OBSERVED_PRICE);
        assert_eq!(loaded.meta.provider, "Local cache");
        assert_eq!(loaded.meta.fetched_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn unknown_mode_strings_read_as_total_return() {
        let dir = TempDir::new().unwrap();
        let store = JsonStoreAdapter::new(dir.path());
        let key = CacheKey::new("sp500", ReturnMode::TotalReturn);
        std::fs::write(
            store.path_for(&key),
            r#"{"requestedReturnMode":"total","resolvedReturnMode":"dividends","fetchedAt":"2024-03-01T00:00:00.000Z","rows":[["2024-02-29",5096.27]]}"#,
        )
        .unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded.meta.requested_return_mode, ReturnMode::TotalReturn);
        assert_eq!(loaded.resolved_return_mode(), ReturnMode::TotalReturn);
        assert_eq!(loaded.len(), 1);
    }
}
