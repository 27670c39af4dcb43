//! Cached market series and their normalisation rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::DcaError;

/// Earliest calendar day any row may carry. Older rows are dropped.
pub fn min_supported_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1985, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    Price,
    TotalReturn,
}

impl ReturnMode {
    pub const ALL: [ReturnMode; 2] = [ReturnMode::Price, ReturnMode::TotalReturn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnMode::Price => "price",
            ReturnMode::TotalReturn => "total_return",
        }
    }

    /// Lenient request-layer reading: anything but `price` means total return.
    pub fn from_request(raw: Option<&str>) -> Self {
        match raw {
            Some("price") => ReturnMode::Price,
            _ => ReturnMode::TotalReturn,
        }
    }
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnMode {
    type Err = DcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "price" => Ok(ReturnMode::Price),
            "total_return" | "total-return" | "tr" => Ok(ReturnMode::TotalReturn),
            other => Err(DcaError::Validation {
                field: "return_mode".into(),
                reason: format!("unknown return mode '{other}', expected price or total_return"),
            }),
        }
    }
}

/// Whether values were observed upstream or synthesised locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    Observed,
    Estimated,
}

/// What a series actually contains: {Observed, Estimated} x {Price, TotalReturn}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesBasis {
    pub mode: ReturnMode,
    pub provenance: Provenance,
}

impl SeriesBasis {
    pub const OBSERVED_PRICE: SeriesBasis = SeriesBasis {
        mode: ReturnMode::Price,
        provenance: Provenance::Observed,
    };
    pub const OBSERVED_TOTAL_RETURN: SeriesBasis = SeriesBasis {
        mode: ReturnMode::TotalReturn,
        provenance: Provenance::Observed,
    };
    pub const ESTIMATED_TOTAL_RETURN: SeriesBasis = SeriesBasis {
        mode: ReturnMode::TotalReturn,
        provenance: Provenance::Estimated,
    };

    pub fn observed(mode: ReturnMode) -> Self {
        SeriesBasis {
            mode,
            provenance: Provenance::Observed,
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.provenance == Provenance::Estimated
    }
}

/// One daily close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub close: f64,
}

impl PriceRow {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    pub fn is_valid(&self) -> bool {
        self.date >= min_supported_date() && self.close.is_finite() && self.close > 0.0
    }
}

/// Drops invalid rows, sorts by date and keeps the last row for duplicated dates.
pub fn normalize_rows<I>(raw: I) -> Vec<PriceRow>
where
    I: IntoIterator<Item = PriceRow>,
{
    let mut rows: Vec<PriceRow> = raw.into_iter().filter(PriceRow::is_valid).collect();
    // stable: later duplicates stay after earlier ones
    rows.sort_by_key(|r| r.date);

    let mut deduped: Vec<PriceRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.date == row.date => *last = row,
            _ => deduped.push(row),
        }
    }
    deduped
}

/// Identifies one cached series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub asset_id: String,
    pub mode: ReturnMode,
}

impl CacheKey {
    pub fn new(asset_id: impl Into<String>, mode: ReturnMode) -> Self {
        Self {
            asset_id: asset_id.into(),
            mode,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_id, self.mode)
    }
}

/// Descriptive fields of an [`AssetSeries`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMeta {
    pub asset_id: String,
    pub asset_name: String,
    pub symbol: String,
    pub requested_return_mode: ReturnMode,
    pub basis: SeriesBasis,
    /// Symbol is a tradable stand-in for the index.
    pub is_proxy: bool,
    pub provider: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

/// A normalised daily series for one (asset, requested mode) pair.
///
/// Rows are strictly ascending, unique by date and positive. The cached
/// `earliest_date`/`latest_date` always match the first and last row, which is
/// why rows can only be replaced through constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    pub meta: SeriesMeta,
    earliest_date: NaiveDate,
    latest_date: NaiveDate,
    rows: Vec<PriceRow>,
}

impl AssetSeries {
    pub fn new<I>(meta: SeriesMeta, raw_rows: I) -> Result<Self, DcaError>
    where
        I: IntoIterator<Item = PriceRow>,
    {
        let rows = normalize_rows(raw_rows);
        let (first, last) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => {
                return Err(DcaError::EmptySeries {
                    asset: meta.asset_name.clone(),
                });
            }
        };
        Ok(Self {
            meta,
            earliest_date: first,
            latest_date: last,
            rows,
        })
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn earliest_date(&self) -> NaiveDate {
        self.earliest_date
    }

    pub fn latest_date(&self) -> NaiveDate {
        self.latest_date
    }

    pub fn resolved_return_mode(&self) -> ReturnMode {
        self.meta.basis.mode
    }

    pub fn is_estimated(&self) -> bool {
        self.meta.basis.is_estimated()
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.meta.asset_id.clone(), self.meta.requested_return_mode)
    }

    /// Time since the series was fetched; a timestamp in the future counts as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.meta.fetched_at).max(Duration::zero())
    }
}
