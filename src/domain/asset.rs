//! Asset catalogue: upstream sources, dividend-yield model and history floor
//! for each supported index.

use std::time::Duration;

use chrono::NaiveDate;

use super::error::DcaError;
use super::series::{AssetSeries, CacheKey, ReturnMode};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Inclusive date range with an assumed annual dividend yield in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub annual_pct: f64,
}

/// Piecewise annual dividend yield used to estimate total return from price.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DividendYieldTable {
    ranges: Vec<YieldRange>,
}

impl DividendYieldTable {
    pub fn new(ranges: Vec<YieldRange>) -> Self {
        Self { ranges }
    }

    /// First matching range wins; dates past every range use the last range.
    pub fn annual_pct_on(&self, date: NaiveDate) -> f64 {
        self.ranges
            .iter()
            .find(|r| date >= r.from && date <= r.to)
            .or_else(|| self.ranges.last())
            .map(|r| r.annual_pct)
            .unwrap_or(0.0)
    }

    pub fn daily_yield_on(&self, date: NaiveDate) -> f64 {
        self.annual_pct_on(date) / 100.0 / TRADING_DAYS_PER_YEAR
    }
}

/// One upstream provider endpoint for a (asset, mode) profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub provider: String,
    /// Name of the column layout to parse the response with (see `[provider.<name>]`).
    pub layout: String,
    pub url: String,
    pub timeout: Duration,
    /// What this source actually delivers, which may differ from what was requested.
    pub resolved_mode: ReturnMode,
    pub symbol: String,
    pub is_proxy: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    pub symbol: String,
    pub is_proxy: bool,
    /// Tried in order.
    pub sources: Vec<SourceSpec>,
}

/// A series in `mode` whose history starts after `latest_start` is treated as
/// truncated and always refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFloor {
    pub mode: ReturnMode,
    pub latest_start: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetProfile {
    pub id: String,
    pub name: String,
    pub price: ModeProfile,
    pub total_return: ModeProfile,
    pub dividend_yields: DividendYieldTable,
    pub history_floor: Option<HistoryFloor>,
}

impl AssetProfile {
    pub fn profile(&self, mode: ReturnMode) -> &ModeProfile {
        match mode {
            ReturnMode::Price => &self.price,
            ReturnMode::TotalReturn => &self.total_return,
        }
    }

    /// Forced historical refresh predicate.
    pub fn requires_history_refresh(&self, series: &AssetSeries) -> bool {
        match &self.history_floor {
            Some(floor) => {
                series.meta.requested_return_mode == floor.mode
                    && series.earliest_date() > floor.latest_start
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetCatalogue {
    assets: Vec<AssetProfile>,
}

impl AssetCatalogue {
    pub fn new(assets: Vec<AssetProfile>) -> Self {
        Self { assets }
    }

    pub fn get(&self, asset_id: &str) -> Result<&AssetProfile, DcaError> {
        self.assets
            .iter()
            .find(|a| a.id == asset_id)
            .ok_or_else(|| DcaError::UnknownAsset {
                asset: asset_id.to_string(),
            })
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.assets.iter().any(|a| a.id == asset_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetProfile> {
        self.assets.iter()
    }

    /// Every (asset, mode) pair the refresh sweep covers.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.assets
            .iter()
            .flat_map(|a| ReturnMode::ALL.map(|mode| CacheKey::new(a.id.clone(), mode)))
            .collect()
    }

    /// S&P 500 and Nasdaq-100, served from Stooq with FRED as a price-only fallback.
    pub fn builtin() -> Self {
        Self::new(vec![sp500(), nasdaq100()])
    }
}

fn stooq(url: &str, secs: u64, mode: ReturnMode, symbol: &str, is_proxy: bool) -> SourceSpec {
    SourceSpec {
        provider: "Stooq".into(),
        layout: "stooq".into(),
        url: url.into(),
        timeout: Duration::from_secs(secs),
        resolved_mode: mode,
        symbol: symbol.into(),
        is_proxy,
    }
}

fn fred(series_id: &str, symbol: &str) -> SourceSpec {
    SourceSpec {
        provider: "FRED".into(),
        layout: "fred".into(),
        url: format!("https://fred.stlouisfed.org/graph/fredgraph.csv?id={series_id}"),
        timeout: Duration::from_secs(22),
        resolved_mode: ReturnMode::Price,
        symbol: symbol.into(),
        is_proxy: false,
    }
}

fn sp500() -> AssetProfile {
    AssetProfile {
        id: "sp500".into(),
        name: "S&P 500".into(),
        price: ModeProfile {
            symbol: "^SPX".into(),
            is_proxy: false,
            sources: vec![
                stooq(
                    "https://stooq.com/q/d/l/?s=%5Espx&i=d",
                    240,
                    ReturnMode::Price,
                    "^SPX",
                    false,
                ),
                fred("SP500", "^SPX"),
            ],
        },
        total_return: ModeProfile {
            symbol: "SPY.US".into(),
            is_proxy: true,
            sources: vec![
                stooq(
                    "https://stooq.com/q/d/l/?s=spy.us&i=d",
                    140,
                    ReturnMode::TotalReturn,
                    "SPY.US",
                    true,
                ),
                fred("SP500", "^SPX"),
            ],
        },
        dividend_yields: DividendYieldTable::new(vec![
            YieldRange { from: ymd(1985, 1, 1), to: ymd(1999, 12, 31), annual_pct: 2.4 },
            YieldRange { from: ymd(2000, 1, 1), to: ymd(2009, 12, 31), annual_pct: 1.9 },
            YieldRange { from: ymd(2010, 1, 1), to: ymd(2019, 12, 31), annual_pct: 2.0 },
            YieldRange { from: ymd(2020, 1, 1), to: ymd(2099, 12, 31), annual_pct: 1.5 },
        ]),
        history_floor: Some(HistoryFloor {
            mode: ReturnMode::Price,
            latest_start: ymd(1990, 1, 1),
        }),
    }
}

fn nasdaq100() -> AssetProfile {
    AssetProfile {
        id: "nasdaq100".into(),
        name: "Nasdaq-100".into(),
        price: ModeProfile {
            symbol: "^NDX".into(),
            is_proxy: false,
            sources: vec![
                stooq(
                    "https://stooq.com/q/d/l/?s=%5Endx&i=d",
                    120,
                    ReturnMode::Price,
                    "^NDX",
                    false,
                ),
                fred("NASDAQ100", "^NDX"),
            ],
        },
        total_return: ModeProfile {
            symbol: "QQQ.US".into(),
            is_proxy: true,
            sources: vec![
                stooq(
                    "https://stooq.com/q/d/l/?s=qqq.us&i=d&d1=19990101",
                    140,
                    ReturnMode::TotalReturn,
                    "QQQ.US",
                    true,
                ),
                fred("NASDAQ100", "^NDX"),
            ],
        },
        dividend_yields: DividendYieldTable::new(vec![
            YieldRange { from: ymd(1985, 1, 1), to: ymd(2003, 12, 31), annual_pct: 0.25 },
            YieldRange { from: ymd(2004, 1, 1), to: ymd(2013, 12, 31), annual_pct: 0.8 },
            YieldRange { from: ymd(2014, 1, 1), to: ymd(2019, 12, 31), annual_pct: 0.9 },
            YieldRange { from: ymd(2020, 1, 1), to: ymd(2099, 12, 31), annual_pct: 0.7 },
        ]),
        history_floor: None,
    }
}
