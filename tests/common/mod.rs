#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dcalab::adapters::csv_adapter::ProviderLayouts;
use dcalab::domain::asset::{
    AssetCatalogue, AssetProfile, DividendYieldTable, HistoryFloor, ModeProfile, SourceSpec,
    YieldRange,
};
use dcalab::domain::error::DcaError;
use dcalab::domain::refresh_policy::RefreshPolicy;
use dcalab::domain::series::{AssetSeries, CacheKey, PriceRow, ReturnMode, SeriesBasis, SeriesMeta};
use dcalab::ports::series_port::SeriesRepository;
use dcalab::ports::source_port::SourcePort;
use dcalab::services::fetcher::SourceFetcher;
use dcalab::services::refresh::RefreshOrchestrator;
use dcalab::services::store::SeriesStore;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TR_URL: &str = "https://tr.test/spy.csv";
pub const PRICE_URL: &str = "https://price.test/spx.csv";
pub const MIN_ROWS: usize = 20;

/// Serves canned bodies keyed by URL and counts every request.
/// Unknown URLs answer with HTTP 404.
pub struct MockSourcePort {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockSourcePort {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_body(self, url: &str, body: String) -> Self {
        self.set_body(url, body);
        self
    }

    pub fn with_failure(self, url: &str, reason: &str) -> Self {
        self.set_failure(url, reason);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_body(&self, url: &str, body: String) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body));
    }

    pub fn set_failure(&self, url: &str, reason: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourcePort for MockSourcePort {
    async fn fetch_text(&self, provider: &str, url: &str) -> Result<String, DcaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok(body)) => Ok(body),
            Some(Err(reason)) => Err(DcaError::Fetch {
                provider: provider.to_string(),
                reason,
            }),
            None => Err(DcaError::Fetch {
                provider: provider.to_string(),
                reason: "HTTP 404".into(),
            }),
        }
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    saved: Mutex<HashMap<CacheKey, AssetSeries>>,
    saves: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(self, series: AssetSeries) -> Self {
        self.saved.lock().unwrap().insert(series.key(), series);
        self
    }

    pub fn stored(&self, key: &CacheKey) -> Option<AssetSeries> {
        self.saved.lock().unwrap().get(key).cloned()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SeriesRepository for InMemoryRepository {
    async fn load(&self, key: &CacheKey) -> Option<AssetSeries> {
        self.stored(key)
    }

    async fn save(&self, series: &AssetSeries) -> Result<(), DcaError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.saved
            .lock()
            .unwrap()
            .insert(series.key(), series.clone());
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily rows from `start`, rising by one per day from `start_close`.
pub fn generate_rows(start: NaiveDate, count: usize, start_close: f64) -> Vec<PriceRow> {
    (0..count)
        .map(|i| PriceRow::new(start + chrono::Duration::days(i as i64), start_close + i as f64))
        .collect()
}

/// FRED-style two-column CSV.
pub fn fred_csv(rows: &[PriceRow]) -> String {
    let mut text = String::from("observation_date,VALUE\n");
    for row in rows {
        writeln!(text, "{},{}", row.date.format("%Y-%m-%d"), row.close).unwrap();
    }
    text
}

fn spec(provider: &str, url: &str, mode: ReturnMode, symbol: &str, is_proxy: bool) -> SourceSpec {
    SourceSpec {
        provider: provider.into(),
        layout: "fred".into(),
        url: url.into(),
        timeout: Duration::from_secs(30),
        resolved_mode: mode,
        symbol: symbol.into(),
        is_proxy,
    }
}

/// One asset with a true total-return source and a price-only fallback.
pub fn test_asset() -> AssetProfile {
    let price_source = spec("PriceFeed", PRICE_URL, ReturnMode::Price, "^SPX", false);
    AssetProfile {
        id: "sp500".into(),
        name: "S&P 500".into(),
        price: ModeProfile {
            symbol: "^SPX".into(),
            is_proxy: false,
            sources: vec![price_source.clone()],
        },
        total_return: ModeProfile {
            symbol: "SPY.US".into(),
            is_proxy: true,
            sources: vec![
                spec("TrFeed", TR_URL, ReturnMode::TotalReturn, "SPY.US", true),
                price_source,
            ],
        },
        dividend_yields: DividendYieldTable::new(vec![YieldRange {
            from: date(1985, 1, 1),
            to: date(2099, 12, 31),
            annual_pct: 2.0,
        }]),
        history_floor: None,
    }
}

pub fn test_asset_with_floor(latest_start: NaiveDate) -> AssetProfile {
    AssetProfile {
        history_floor: Some(HistoryFloor {
            mode: ReturnMode::Price,
            latest_start,
        }),
        ..test_asset()
    }
}

pub fn series(
    requested: ReturnMode,
    basis: SeriesBasis,
    rows: Vec<PriceRow>,
    fetched_at: DateTime<Utc>,
) -> AssetSeries {
    AssetSeries::new(
        SeriesMeta {
            asset_id: "sp500".into(),
            asset_name: "S&P 500".into(),
            symbol: "^SPX".into(),
            requested_return_mode: requested,
            basis,
            is_proxy: false,
            provider: "Cache".into(),
            source_url: String::new(),
            fetched_at,
        },
        rows,
    )
    .unwrap()
}

pub struct Harness {
    pub source: Arc<MockSourcePort>,
    pub repository: Arc<InMemoryRepository>,
    pub orchestrator: RefreshOrchestrator,
}

pub fn harness_with(
    asset: AssetProfile,
    source: MockSourcePort,
    repository: InMemoryRepository,
    policy: RefreshPolicy,
) -> Harness {
    let source = Arc::new(source);
    let repository = Arc::new(repository);
    let fetcher = SourceFetcher::new(source.clone(), ProviderLayouts::default(), MIN_ROWS);
    let store = SeriesStore::new(repository.clone());
    let orchestrator =
        RefreshOrchestrator::new(AssetCatalogue::new(vec![asset]), fetcher, store, policy);
    Harness {
        source,
        repository,
        orchestrator,
    }
}

pub fn harness(source: MockSourcePort, repository: InMemoryRepository) -> Harness {
    harness_with(test_asset(), source, repository, RefreshPolicy::default())
}
