//! Side-by-side DCA comparison of up to two assets over their common window.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::info;

use crate::domain::error::DcaError;
use crate::domain::request::SimulationRequest;
use crate::domain::series::{AssetSeries, ReturnMode};
use crate::domain::simulation::{simulate, SimulationParams, SimulationResult};
use crate::services::refresh::{GetSeriesOptions, RefreshOrchestrator};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRun {
    pub asset_id: String,
    pub asset_name: String,
    pub symbol: String,
    pub requested_return_mode: ReturnMode,
    pub resolved_return_mode: ReturnMode,
    pub is_proxy: bool,
    pub is_estimated: bool,
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub annualized_return: Option<f64>,
    #[serde(flatten)]
    pub simulation: SimulationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub generated_at: DateTime<Utc>,
    pub request: SimulationRequest,
    pub effective_start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub warnings: Vec<String>,
    pub series: Vec<AssetRun>,
}

/// Latest first date and earliest last date across `series`.
pub fn common_window(series: &[AssetSeries]) -> Option<(NaiveDate, NaiveDate)> {
    let start = series.iter().map(AssetSeries::earliest_date).max()?;
    let end = series.iter().map(AssetSeries::latest_date).min()?;
    Some((start, end))
}

pub async fn run_comparison(
    orchestrator: &RefreshOrchestrator,
    request: &SimulationRequest,
) -> Result<ComparisonReport, DcaError> {
    let selected = try_join_all(request.assets.iter().map(|id| {
        orchestrator.get_series(id, request.return_mode, GetSeriesOptions::default())
    }))
    .await?;

    compare(&selected, request, Utc::now())
}

/// The pure half of [`run_comparison`], over already-resolved series.
pub fn compare(
    selected: &[AssetSeries],
    request: &SimulationRequest,
    generated_at: DateTime<Utc>,
) -> Result<ComparisonReport, DcaError> {
    let (common_start, common_end) = common_window(selected).ok_or_else(|| {
        DcaError::Validation {
            field: "assets".into(),
            reason: "no assets selected".into(),
        }
    })?;

    if request.start_date > common_end {
        return Err(DcaError::SimulationRange {
            reason: format!(
                "start date {} is after the common available range; choose a date no later than {common_end}",
                request.start_date
            ),
        });
    }

    let mut warnings = Vec::new();
    let effective_start = request.start_date.max(common_start);
    if effective_start != request.start_date {
        warnings.push(format!(
            "start date moved to {effective_start}, the first date all selected assets share"
        ));
    }
    for series in selected {
        if series.resolved_return_mode() != request.return_mode {
            warnings.push(format!(
                "{} is served as {} (requested {})",
                series.meta.asset_name,
                series.resolved_return_mode(),
                request.return_mode
            ));
        } else if series.is_estimated() {
            warnings.push(format!(
                "{} total return is estimated from price data with a dividend-yield model",
                series.meta.asset_name
            ));
        }
    }

    let params = SimulationParams {
        start_date: effective_start,
        end_date: common_end,
        frequency: request.frequency,
        amount: request.amount,
        precision: request.precision,
    };

    let mut runs = Vec::with_capacity(selected.len());
    for series in selected {
        let simulation = simulate(series.rows(), &params)?;
        info!(
            asset = %series.meta.asset_id,
            mode = %request.return_mode,
            snapshots = simulation.snapshots.len(),
            ending_value = simulation.summary.ending_value,
            "simulated DCA run"
        );
        runs.push(AssetRun {
            asset_id: series.meta.asset_id.clone(),
            asset_name: series.meta.asset_name.clone(),
            symbol: series.meta.symbol.clone(),
            requested_return_mode: series.meta.requested_return_mode,
            resolved_return_mode: series.resolved_return_mode(),
            is_proxy: series.meta.is_proxy,
            is_estimated: series.is_estimated(),
            provider: series.meta.provider.clone(),
            fetched_at: series.meta.fetched_at,
            annualized_return: simulation.annualized_return(),
            simulation,
        });
    }

    Ok(ComparisonReport {
        generated_at,
        request: request.clone(),
        effective_start_date: effective_start,
        end_date: common_end,
        warnings,
        series: runs,
    })
}
