//! Upstream fetch with provider fallback.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::adapters::csv_adapter::{parse_rows, ProviderLayouts};
use crate::domain::asset::{AssetProfile, SourceSpec};
use crate::domain::error::DcaError;
use crate::domain::series::{normalize_rows, AssetSeries, ReturnMode, SeriesBasis, SeriesMeta};
use crate::ports::source_port::SourcePort;

pub const DEFAULT_MIN_ROWS: usize = 200;

/// Tries each source of a mode profile in order until one yields enough history.
pub struct SourceFetcher {
    source: Arc<dyn SourcePort>,
    layouts: ProviderLayouts,
    min_rows: usize,
}

impl SourceFetcher {
    pub fn new(source: Arc<dyn SourcePort>, layouts: ProviderLayouts, min_rows: usize) -> Self {
        Self {
            source,
            layouts,
            min_rows,
        }
    }

    /// The first source that answers within its timeout with at least
    /// `min_rows` valid rows wins. The result is labelled with what that source
    /// actually delivers, which may be price data for a total-return request.
    pub async fn fetch(
        &self,
        asset: &AssetProfile,
        mode: ReturnMode,
    ) -> Result<AssetSeries, DcaError> {
        let sources = &asset.profile(mode).sources;
        if sources.is_empty() {
            return Err(DcaError::UnsupportedMode {
                asset: asset.id.clone(),
                mode,
            });
        }

        let mut reasons: Vec<String> = Vec::new();
        for spec in sources {
            match self.attempt(asset, mode, spec).await {
                Ok(series) => {
                    info!(
                        asset = %asset.id,
                        mode = %mode,
                        provider = %spec.provider,
                        rows = series.len(),
                        earliest = %series.earliest_date(),
                        latest = %series.latest_date(),
                        "fetched upstream series"
                    );
                    return Ok(series);
                }
                Err(e) => {
                    if e.is_provider_failure() {
                        debug!(asset = %asset.id, provider = %spec.provider, error = %e, "provider failed, trying next");
                    } else {
                        warn!(asset = %asset.id, provider = %spec.provider, error = %e, "provider unusable");
                    }
                    reasons.push(format!(
                        "{}({}): {}",
                        spec.provider,
                        spec.resolved_mode,
                        failure_reason(&e)
                    ));
                }
            }
        }

        Err(DcaError::AllProvidersFailed {
            asset: asset.name.clone(),
            mode,
            reasons: reasons.join(" | "),
        })
    }

    async fn attempt(
        &self,
        asset: &AssetProfile,
        mode: ReturnMode,
        spec: &SourceSpec,
    ) -> Result<AssetSeries, DcaError> {
        let layout = self.layouts.get(&spec.layout)?;

        // dropping the request future on expiry aborts the transfer
        let text = tokio::time::timeout(
            spec.timeout,
            self.source.fetch_text(&spec.provider, &spec.url),
        )
        .await
        .map_err(|_| DcaError::Timeout {
            what: format!("{} request", spec.provider),
            millis: u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX),
        })??;

        let rows = normalize_rows(parse_rows(&text, layout));
        if rows.len() < self.min_rows {
            return Err(DcaError::InsufficientData {
                provider: spec.provider.clone(),
                rows: rows.len(),
                minimum: self.min_rows,
            });
        }

        let meta = SeriesMeta {
            asset_id: asset.id.clone(),
            asset_name: asset.name.clone(),
            symbol: spec.symbol.clone(),
            requested_return_mode: mode,
            basis: SeriesBasis::observed(spec.resolved_mode),
            is_proxy: spec.is_proxy,
            provider: spec.provider.clone(),
            source_url: spec.url.clone(),
            fetched_at: Utc::now(),
        };
        AssetSeries::new(meta, rows)
    }
}

fn failure_reason(err: &DcaError) -> String {
    match err {
        DcaError::Fetch { reason, .. } => reason.clone(),
        DcaError::InsufficientData { rows, minimum, .. } => {
            format!("too few rows ({rows} < {minimum})")
        }
        DcaError::Timeout { millis, .. } => format!("timed out after {millis}ms"),
        other => other.to_string(),
    }
}
