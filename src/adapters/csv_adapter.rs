//! Delimited-text parsing for upstream providers.
//!
//! Each provider names a [`ColumnLayout`]; the layouts come from
//! `[provider.<name>]` config sections on top of the built-in ones.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::error::DcaError;
use crate::domain::series::PriceRow;
use crate::ports::config_port::ConfigPort;

/// Where the date and close live in one provider's CSV rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date_column: usize,
    pub close_column: usize,
    pub has_header: bool,
}

impl ColumnLayout {
    /// `Date,Open,High,Low,Close,Volume`
    pub const STOOQ: ColumnLayout = ColumnLayout {
        date_column: 0,
        close_column: 4,
        has_header: true,
    };

    /// `observation_date,SERIES_ID`
    pub const FRED: ColumnLayout = ColumnLayout {
        date_column: 0,
        close_column: 1,
        has_header: true,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLayouts {
    layouts: HashMap<String, ColumnLayout>,
}

impl Default for ProviderLayouts {
    fn default() -> Self {
        let mut layouts = HashMap::new();
        layouts.insert("stooq".to_string(), ColumnLayout::STOOQ);
        layouts.insert("fred".to_string(), ColumnLayout::FRED);
        Self { layouts }
    }
}

impl ProviderLayouts {
    /// Built-in layouts overridden or extended by `[provider.<name>]` sections.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let mut layouts = Self::default();
        for section in config.sections_with_prefix("provider.") {
            let Some(name) = section.strip_prefix("provider.") else {
                continue;
            };
            let base = layouts
                .layouts
                .get(name)
                .copied()
                .unwrap_or(ColumnLayout::STOOQ);
            let column = |key: &str, fallback: usize| {
                usize::try_from(config.get_int(&section, key, fallback as i64)).unwrap_or(fallback)
            };
            let layout = ColumnLayout {
                date_column: column("date_column", base.date_column),
                close_column: column("close_column", base.close_column),
                has_header: config.get_bool(&section, "has_header", base.has_header),
            };
            layouts.layouts.insert(name.to_string(), layout);
        }
        layouts
    }

    pub fn get(&self, name: &str) -> Result<ColumnLayout, DcaError> {
        self.layouts
            .get(name)
            .copied()
            .ok_or_else(|| DcaError::ConfigMissing {
                section: format!("provider.{name}"),
                key: "close_column".to_string(),
            })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Parses `(date, close)` pairs from `text`. Malformed lines, missing values
/// (FRED writes `.`) and non-positive closes are skipped.
pub fn parse_rows(text: &str, layout: ColumnLayout) -> Vec<PriceRow> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(layout.has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim().as_bytes());

    let mut rows = Vec::new();
    for record in rdr.records() {
        let Ok(record) = record else {
            continue;
        };
        let date = record.get(layout.date_column).and_then(parse_date);
        let close = record
            .get(layout.close_column)
            .and_then(|c| c.parse::<f64>().ok());
        if let (Some(date), Some(close)) = (date, close) {
            let row = PriceRow::new(date, close);
            if row.is_valid() {
                rows.push(row);
            }
        }
    }
    rows
}
