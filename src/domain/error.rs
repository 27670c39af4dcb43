//! Domain error types.
//!
//! Every variant carries owned strings rather than source errors so that a
//! single failed refresh outcome can be cloned out to every waiter.

use super::series::ReturnMode;

/// Top-level error type for dcalab.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DcaError {
    #[error("{provider} fetch failed: {reason}")]
    Fetch { provider: String, reason: String },

    #[error("{provider} returned too little history: {rows} rows, need {minimum}")]
    InsufficientData {
        provider: String,
        rows: usize,
        minimum: usize,
    },

    #[error("{asset}[{mode}] upstream data unavailable ({reasons})")]
    AllProvidersFailed {
        asset: String,
        mode: ReturnMode,
        reasons: String,
    },

    #[error("{what} timed out after {millis}ms")]
    Timeout { what: String, millis: u64 },

    #[error("refresh of {key} aborted: {reason}")]
    RefreshAborted { key: String, reason: String },

    #[error("simulation range error: {reason}")]
    SimulationRange { reason: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unsupported asset: {asset}")]
    UnknownAsset { asset: String },

    #[error("asset {asset} has no {mode} profile")]
    UnsupportedMode { asset: String, mode: ReturnMode },

    #[error("{asset} has no valid history rows")]
    EmptySeries { asset: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("storage error at {path}: {reason}")]
    Storage { path: String, reason: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl DcaError {
    /// True for errors that come from a single upstream provider attempt and
    /// should move the fetcher on to the next provider.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            DcaError::Fetch { .. } | DcaError::InsufficientData { .. } | DcaError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for DcaError {
    fn from(err: serde_json::Error) -> Self {
        DcaError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&DcaError> for std::process::ExitCode {
    fn from(err: &DcaError) -> Self {
        let code: u8 = match err {
            DcaError::Storage { .. } | DcaError::Serialization { .. } => 1,
            DcaError::ConfigParse { .. }
            | DcaError::ConfigMissing { .. }
            | DcaError::ConfigInvalid { .. } => 2,
            DcaError::Fetch { .. }
            | DcaError::InsufficientData { .. }
            | DcaError::AllProvidersFailed { .. }
            | DcaError::Timeout { .. }
            | DcaError::RefreshAborted { .. }
            | DcaError::EmptySeries { .. } => 3,
            DcaError::Validation { .. }
            | DcaError::UnknownAsset { .. }
            | DcaError::UnsupportedMode { .. } => 4,
            DcaError::SimulationRange { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_providers_failed_names_every_reason() {
        let err = DcaError::AllProvidersFailed {
            asset: "S&P 500".into(),
            mode: ReturnMode::TotalReturn,
            reasons: "Stooq(total_return): HTTP 503 | FRED(price): timed out".into(),
        };
        let text = err.to_string();
        assert!(text.contains("S&P 500[total_return]"));
        assert!(text.contains("Stooq(total_return): HTTP 503"));
        assert!(text.contains("FRED(price): timed out"));
    }

    #[test]
    fn provider_failures_are_recoverable() {
        assert!(
            DcaError::InsufficientData {
                provider: "Stooq".into(),
                rows: 12,
                minimum: 200,
            }
            .is_provider_failure()
        );
        assert!(
            !DcaError::SimulationRange {
                reason: "empty".into()
            }
            .is_provider_failure()
        );
    }
}
