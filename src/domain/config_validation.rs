//! Configuration validation.
//!
//! Checks values that have no sensible fallback. Timing keys are not checked
//! here: an invalid `*_ms` value silently keeps its default.

use crate::adapters::csv_adapter::ProviderLayouts;
use crate::domain::error::DcaError;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), DcaError> {
    validate_min_rows(config)?;
    validate_retained_ratio(config)?;
    validate_provider_layouts(config)?;
    validate_log_format(config)?;
    Ok(())
}

fn validate_min_rows(config: &dyn ConfigPort) -> Result<(), DcaError> {
    if config.get_string("fetch", "min_rows").is_none() {
        return Ok(());
    }
    let value = config.get_int("fetch", "min_rows", -1);
    if value <= 0 {
        return Err(DcaError::ConfigInvalid {
            section: "fetch".to_string(),
            key: "min_rows".to_string(),
            reason: "min_rows must be a positive integer".to_string(),
        });
    }
    Ok(())
}

fn validate_retained_ratio(config: &dyn ConfigPort) -> Result<(), DcaError> {
    if config.get_string("cache", "min_retained_ratio").is_none() {
        return Ok(());
    }
    let ratio = config.get_double("cache", "min_retained_ratio", f64::NAN);
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(DcaError::ConfigInvalid {
            section: "cache".to_string(),
            key: "min_retained_ratio".to_string(),
            reason: "min_retained_ratio must be in (0, 1]".to_string(),
        });
    }
    Ok(())
}

fn validate_provider_layouts(config: &dyn ConfigPort) -> Result<(), DcaError> {
    let sections = config.sections_with_prefix("provider.");
    for section in &sections {
        column(config, section, "date_column")?;
        column(config, section, "close_column")?;
    }

    // unset columns inherit from the built-in layout
    let layouts = ProviderLayouts::from_config(config);
    for section in sections {
        let Some(name) = section.strip_prefix("provider.") else {
            continue;
        };
        let layout = layouts.get(name)?;
        if layout.date_column == layout.close_column {
            return Err(DcaError::ConfigInvalid {
                reason: format!(
                    "close_column and date_column are both {}",
                    layout.close_column
                ),
                section,
                key: "close_column".to_string(),
            });
        }
    }
    Ok(())
}

fn column(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), DcaError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    match raw.trim().parse::<i64>() {
        Ok(index) if index >= 0 => Ok(()),
        _ => Err(DcaError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{raw}' is not a column index"),
        }),
    }
}

fn validate_log_format(config: &dyn ConfigPort) -> Result<(), DcaError> {
    let format = config
        .get_string("logging", "format")
        .map(|raw| raw.trim().to_lowercase());
    match format.as_deref() {
        None | Some("pretty") | Some("compact") | Some("json") => Ok(()),
        Some(other) => Err(DcaError::ConfigInvalid {
            section: "logging".to_string(),
            key: "format".to_string(),
            reason: format!("'{other}' is not one of pretty, compact, json"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[cache]
dir = data/market-cache

[refresh]
interval_ms = 3600000

[fetch]
min_rows = 200

[provider.stooq]
date_column = 0
close_column = 4
has_header = true

[logging]
level = info
format = json
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_config_passes() {
        assert!(validate_config(&FileConfigAdapter::empty()).is_ok());
    }

    #[test]
    fn min_rows_zero_fails() {
        let config = make_config("[fetch]\nmin_rows = 0\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, DcaError::ConfigInvalid { key, .. } if key == "min_rows"));
    }

    #[test]
    fn min_rows_non_numeric_fails() {
        let config = make_config("[fetch]\nmin_rows = lots\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, DcaError::ConfigInvalid { key, .. } if key == "min_rows"));
    }

    #[test]
    fn retained_ratio_outside_unit_interval_fails() {
        for raw in ["0", "1.5", "most"] {
            let config = make_config(&format!("[cache]\nmin_retained_ratio = {raw}\n"));
            let err = validate_config(&config).unwrap_err();
            assert!(
                matches!(err, DcaError::ConfigInvalid { key, .. } if key == "min_retained_ratio")
            );
        }
        let config = make_config("[cache]\nmin_retained_ratio = 0.5\n");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn coinciding_columns_fail() {
        let config = make_config("[provider.fred]\ndate_column = 1\nclose_column = 1\n");
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, DcaError::ConfigInvalid { section, .. } if section == "provider.fred")
        );
    }

    #[test]
    fn inherited_column_colliding_with_override_fails() {
        // fred keeps its built-in date column 0
        let config = make_config("[provider.fred]\nclose_column = 0\n");
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, DcaError::ConfigInvalid { section, .. } if section == "provider.fred")
        );

        // new providers start from the stooq layout
        let config = make_config("[provider.yahoo]\ndate_column = 4\n");
        assert!(validate_config(&config).is_err());

        let config = make_config("[provider.fred]\nclose_column = 2\n");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn negative_column_fails() {
        let config = make_config("[provider.stooq]\nclose_column = -1\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, DcaError::ConfigInvalid { key, .. } if key == "close_column"));
    }

    #[test]
    fn unknown_log_format_fails() {
        let config = make_config("[logging]\nformat = xml\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, DcaError::ConfigInvalid { key, .. } if key == "format"));
    }
}
