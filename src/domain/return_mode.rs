//! Return-mode resolution: estimating total return from price data and
//! stitching short total-return histories onto longer price histories.

use super::asset::DividendYieldTable;
use super::error::DcaError;
use super::metrics::days_between;
use super::series::{AssetSeries, PriceRow, ReturnMode, SeriesBasis};
use chrono::NaiveDate;

/// Synthesise a total-return level from price rows.
///
/// The level starts at the first close and compounds the price ratio of each
/// step with `(1 + daily_yield)^gap_days`, where `gap_days` is the calendar gap
/// between consecutive rows (at least 1) and the yield is looked up on the
/// later row's date.
pub fn estimate_total_return_rows(rows: &[PriceRow], yields: &DividendYieldTable) -> Vec<PriceRow> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let mut level = first.close;
    let mut output = Vec::with_capacity(rows.len());
    output.push(PriceRow::new(first.date, level));

    for pair in rows.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if !(prev.close > 0.0) || !(curr.close > 0.0) {
            continue;
        }
        let price_factor = curr.close / prev.close;
        let gap_days = days_between(prev.date, curr.date).max(1);
        let dividend_factor = (1.0 + yields.daily_yield_on(curr.date)).powi(gap_days as i32);
        level *= price_factor * dividend_factor;
        output.push(PriceRow::new(curr.date, level));
    }

    output
}

/// Estimated total-return series built from `series`.
///
/// An observed total-return series is returned unchanged.
pub fn estimate_total_return(
    series: &AssetSeries,
    yields: &DividendYieldTable,
) -> Result<AssetSeries, DcaError> {
    if series.meta.basis == SeriesBasis::OBSERVED_TOTAL_RETURN {
        return Ok(series.clone());
    }

    let mut meta = series.meta.clone();
    meta.provider = format!("{} + DividendModel", series.meta.provider);
    meta.requested_return_mode = ReturnMode::TotalReturn;
    meta.basis = SeriesBasis::ESTIMATED_TOTAL_RETURN;
    meta.is_proxy = true;

    AssetSeries::new(meta, estimate_total_return_rows(series.rows(), yields))
}

/// Row nearest to `target`; on equal distance the earlier row wins.
pub fn closest_row_by_date(rows: &[PriceRow], target: NaiveDate) -> Option<PriceRow> {
    let split = rows.partition_point(|r| r.date <= target);
    let left = split.checked_sub(1).and_then(|i| rows.get(i)).copied();
    let right = rows.get(split).copied();

    match (left, right) {
        (None, right) => right,
        (left, None) => left,
        (Some(l), Some(r)) => {
            let left_gap = (target - l.date).num_days().abs();
            let right_gap = (r.date - target).num_days().abs();
            if left_gap <= right_gap { Some(l) } else { Some(r) }
        }
    }
}

/// Prepend scale-matched estimated history to a true total-return series that
/// starts later than the available price history.
///
/// Passthrough for estimated series, when the total-return series already
/// starts at or before the price series, or when either series cannot provide
/// an anchor.
pub fn backfill_total_return(
    total: &AssetSeries,
    price: &AssetSeries,
    yields: &DividendYieldTable,
) -> Result<AssetSeries, DcaError> {
    if total.is_estimated()
        || total.is_empty()
        || price.is_empty()
        || total.earliest_date() <= price.earliest_date()
    {
        return Ok(total.clone());
    }

    let estimated = estimate_total_return_rows(price.rows(), yields);
    if estimated.len() < 2 {
        return Ok(total.clone());
    }

    let anchor_total = total.rows()[0];
    let Some(anchor_estimated) = closest_row_by_date(&estimated, anchor_total.date) else {
        return Ok(total.clone());
    };
    if !(anchor_estimated.close > 0.0) || !(anchor_total.close > 0.0) {
        return Ok(total.clone());
    }

    let scale = anchor_total.close / anchor_estimated.close;
    let history: Vec<PriceRow> = estimated
        .iter()
        .filter(|r| r.date < anchor_total.date)
        .map(|r| PriceRow::new(r.date, r.close * scale))
        .collect();
    if history.is_empty() {
        return Ok(total.clone());
    }

    let mut meta = total.meta.clone();
    meta.provider = format!("{} + HistoryBackfill", total.meta.provider);
    meta.requested_return_mode = ReturnMode::TotalReturn;
    meta.basis = SeriesBasis::OBSERVED_TOTAL_RETURN;

    AssetSeries::new(meta, history.into_iter().chain(total.rows().iter().copied()))
}

/// View `series` under the `requested` mode.
///
/// Total return from a price series is estimated; any other mismatch only
/// relabels the requested mode.
pub fn alias_for_mode(
    series: &AssetSeries,
    requested: ReturnMode,
    yields: &DividendYieldTable,
) -> Result<AssetSeries, DcaError> {
    if requested == ReturnMode::TotalReturn {
        if series.resolved_return_mode() == ReturnMode::TotalReturn {
            return Ok(series.clone());
        }
        return estimate_total_return(series, yields);
    }

    if series.meta.requested_return_mode == requested {
        return Ok(series.clone());
    }
    let mut aliased = series.clone();
    aliased.meta.requested_return_mode = requested;
    Ok(aliased)
}

/// A total-return entry that is only an estimate should be upgraded once
/// upstream serves true total-return data again.
pub fn needs_mode_upgrade(series: &AssetSeries) -> bool {
    series.meta.requested_return_mode == ReturnMode::TotalReturn
        && (series.resolved_return_mode() != ReturnMode::TotalReturn || series.is_estimated())
}
