//! Diagnostics output.
//!
//! Everything in botpilot logs through `tracing`; this module installs the
//! subscriber. The filter and format come from the config file's
//! `[logging]` section unless the environment overrides them:
//!
//! - `BOTPILOT_LOG`, then `RUST_LOG`: filter directives
//! - `BOTPILOT_LOG_FORMAT`: `pretty`, `compact` or `json`
//!
//! ```bash
//! BOTPILOT_LOG=botpilot_core=debug,warn botpilot run scripts/preempt.toml
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

pub const DEFAULT_FILTER: &str = "botpilot=info,botpilot_core=info,warn";

const FILTER_VARS: [&str; 2] = ["BOTPILOT_LOG", "RUST_LOG"];
const FORMAT_VAR: &str = "BOTPILOT_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured.
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Case-insensitive; anything unrecognised is `Pretty`.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else if s.eq_ignore_ascii_case("compact") {
            Self::Compact
        } else {
            Self::Pretty
        }
    }
}

/// Resolved subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Log span open/close, useful for following a manager operation.
    pub span_events: bool,
    /// Include source file and line.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            span_events: false,
            source_location: false,
        }
    }
}

impl LogConfig {
    /// Filter directives from the environment, if set.
    pub fn env_filter() -> Option<String> {
        FILTER_VARS.iter().find_map(|var| std::env::var(var).ok())
    }

    /// Output format from the environment, if set.
    pub fn env_format() -> Option<LogFormat> {
        std::env::var(FORMAT_VAR).ok().map(|s| LogFormat::parse(&s))
    }

    /// Defaults overridden by whatever the environment sets.
    pub fn from_env() -> Self {
        Self::layered(None, None)
    }

    /// Environment first, then the given file settings, then defaults.
    pub fn layered(filter: Option<&str>, format: Option<LogFormat>) -> Self {
        Self {
            filter: Self::env_filter()
                .or_else(|| filter.map(str::to_string))
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            format: Self::env_format().or(format).unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Verbose settings for `--verbose`.
    pub fn debug() -> Self {
        Self {
            filter: "botpilot=debug,botpilot_core=debug,info".to_string(),
            format: LogFormat::Compact,
            span_events: true,
            source_location: true,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| {
        eprintln!("invalid log filter {:?}, using {DEFAULT_FILTER}", config.filter);
        EnvFilter::new(DEFAULT_FILTER)
    });
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_span_events(spans)
        .with_file(config.source_location)
        .with_line_number(config.source_location);
    let layer = match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn format_deserializes_from_lowercase() {
        #[derive(Deserialize)]
        struct Section {
            format: LogFormat,
        }
        let section: Section = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(section.format, LogFormat::Json);
    }

    #[test]
    fn verbose_config_shows_sources() {
        let config = LogConfig::debug();
        assert!(config.filter.starts_with("botpilot=debug"));
        assert!(config.source_location);
        assert!(config.span_events);
    }
}
