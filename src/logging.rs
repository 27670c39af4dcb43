//! tracing subscriber setup.
//!
//! `RUST_LOG`, when set, overrides the configured level filter.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::error::DcaError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, coloured output for terminals.
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = DcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(DcaError::ConfigInvalid {
                section: "logging".into(),
                key: "format".into(),
                reason: format!("unknown log format '{other}', expected pretty, compact or json"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `dcalab=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Reads `[logging] level` and `[logging] format`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, DcaError> {
        let level = config
            .get_string("logging", "level")
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let format = match config.get_string("logging", "format") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };
        Ok(Self { level, format })
    }

    /// Overrides the level with `verbose` occurrences of `-v`.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        match verbose {
            0 => {}
            1 => self.level = "debug".to_string(),
            _ => self.level = "trace".to_string(),
        }
        self
    }
}

/// Installs the global subscriber. Fails if one is already installed or the
/// level directive does not parse.
pub fn init(config: &LogConfig) -> Result<(), DcaError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| DcaError::ConfigInvalid {
            section: "logging".into(),
            key: "level".into(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(fmt_layer::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt_layer::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt_layer::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| DcaError::ConfigInvalid {
        section: "logging".into(),
        key: "format".into(),
        reason: e.to_string(),
    })?;

    tracing::debug!(format = %config.format, level = %config.level, "logging initialised");
    Ok(())
}
