//! Comparison request validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::AssetCatalogue;
use super::error::DcaError;
use super::series::ReturnMode;
use super::simulation::{Frequency, Precision};

const MAX_ASSETS: usize = 2;

/// A comparison request as it arrives from the outside, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSimulationRequest {
    #[serde(default)]
    pub assets: Vec<String>,
    pub return_mode: Option<String>,
    pub frequency: Option<String>,
    pub precision: Option<String>,
    pub start_date: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub assets: Vec<String>,
    pub return_mode: ReturnMode,
    pub frequency: Frequency,
    pub precision: Precision,
    pub start_date: NaiveDate,
    pub amount: f64,
}

fn invalid(field: &str, reason: impl Into<String>) -> DcaError {
    DcaError::Validation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl SimulationRequest {
    /// Checks every field before any data is touched. Duplicate assets collapse
    /// to their first occurrence; an absent or unknown return mode means total return.
    pub fn validate(
        raw: &RawSimulationRequest,
        catalogue: &AssetCatalogue,
    ) -> Result<Self, DcaError> {
        let mut assets: Vec<String> = Vec::new();
        for id in &raw.assets {
            if !assets.contains(id) {
                assets.push(id.clone());
            }
        }
        if assets.is_empty() || assets.len() > MAX_ASSETS {
            return Err(invalid("assets", "choose between 1 and 2 assets"));
        }
        for id in &assets {
            catalogue.get(id)?;
        }

        let frequency: Frequency = raw
            .frequency
            .as_deref()
            .ok_or_else(|| invalid("frequency", "missing"))?
            .parse()?;

        let precision: Precision = raw
            .precision
            .as_deref()
            .ok_or_else(|| invalid("precision", "missing"))?
            .parse()?;

        let start_raw = raw
            .start_date
            .as_deref()
            .ok_or_else(|| invalid("startDate", "missing, expected YYYY-MM-DD"))?;
        let start_date = NaiveDate::parse_from_str(start_raw, "%Y-%m-%d")
            .map_err(|e| invalid("startDate", format!("'{start_raw}' is not YYYY-MM-DD: {e}")))?;

        let amount = raw.amount.ok_or_else(|| invalid("amount", "missing"))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(invalid("amount", "must be a positive number"));
        }

        Ok(Self {
            assets,
            return_mode: ReturnMode::from_request(raw.return_mode.as_deref()),
            frequency,
            precision,
            start_date,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawSimulationRequest {
        RawSimulationRequest {
            assets: vec!["sp500".into(), "nasdaq100".into()],
            return_mode: Some("price".into()),
            frequency: Some("monthly".into()),
            precision: Some("weekly".into()),
            start_date: Some("2010-01-15".into()),
            amount: Some(500.0),
        }
    }

    fn field_of(err: DcaError) -> String {
        match err {
            DcaError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_parses() {
        let req = SimulationRequest::validate(&raw(), &AssetCatalogue::builtin()).unwrap();
        assert_eq!(req.assets, vec!["sp500", "nasdaq100"]);
        assert_eq!(req.return_mode, ReturnMode::Price);
        assert_eq!(req.frequency, Frequency::Monthly);
        assert_eq!(req.precision, Precision::Weekly);
        assert_eq!(req.start_date, NaiveDate::from_ymd_opt(2010, 1, 15).unwrap());
    }

    #[test]
    fn duplicate_assets_collapse() {
        let mut r = raw();
        r.assets = vec!["sp500".into(), "sp500".into(), "nasdaq100".into()];
        let req = SimulationRequest::validate(&r, &AssetCatalogue::builtin()).unwrap();
        assert_eq!(req.assets.len(), 2);
    }

    #[test]
    fn asset_count_is_bounded() {
        let mut r = raw();
        r.assets.clear();
        let err = SimulationRequest::validate(&r, &AssetCatalogue::builtin()).unwrap_err();
        assert_eq!(field_of(err), "assets");
    }

    #[test]
    fn unknown_asset_is_rejected() {
        let mut r = raw();
        r.assets = vec!["ftse".into()];
        let err = SimulationRequest::validate(&r, &AssetCatalogue::builtin()).unwrap_err();
        assert!(matches!(err, DcaError::UnknownAsset { .. }));
    }

    #[test]
    fn bad_fields_name_the_field() {
        let catalogue = AssetCatalogue::builtin();

        let mut r = raw();
        r.frequency = Some("yearly".into());
        assert_eq!(field_of(SimulationRequest::validate(&r, &catalogue).unwrap_err()), "frequency");

        let mut r = raw();
        r.precision = Some("daily".into());
        assert_eq!(field_of(SimulationRequest::validate(&r, &catalogue).unwrap_err()), "precision");

        let mut r = raw();
        r.start_date = Some("15/01/2010".into());
        assert_eq!(field_of(SimulationRequest::validate(&r, &catalogue).unwrap_err()), "startDate");

        let mut r = raw();
        r.amount = Some(0.0);
        assert_eq!(field_of(SimulationRequest::validate(&r, &catalogue).unwrap_err()), "amount");

        let mut r = raw();
        r.amount = Some(f64::NAN);
        assert_eq!(field_of(SimulationRequest::validate(&r, &catalogue).unwrap_err()), "amount");
    }

    #[test]
    fn missing_return_mode_means_total_return() {
        let mut r = raw();
        r.return_mode = None;
        let req = SimulationRequest::validate(&r, &AssetCatalogue::builtin()).unwrap();
        assert_eq!(req.return_mode, ReturnMode::TotalReturn);
    }

    #[test]
    fn deserializes_camel_case_json() {
        let r: RawSimulationRequest = serde_json::from_str(
            r#"{"assets":["sp500"],"frequency":"weekly","precision":"monthly","startDate":"2001-02-03","amount":25}"#,
        )
        .unwrap();
        let req = SimulationRequest::validate(&r, &AssetCatalogue::builtin()).unwrap();
        assert_eq!(req.frequency, Frequency::Weekly);
        assert_eq!(req.amount, 25.0);
    }
}
