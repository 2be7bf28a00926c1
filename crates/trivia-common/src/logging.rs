//! Subscriber setup for binaries.
//!
//! Libraries in the workspace only emit `tracing` events; whichever binary
//! runs them installs the subscriber once through [`init_logging`]. Output
//! goes to stderr so stdout stays free for reports.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: LogFormat,
    /// File and line of each event (pretty format only).
    pub include_location: bool,
    /// Emit span enter/close events, e.g. around worker install.
    pub include_span_events: bool,
    /// `EnvFilter` directives such as `"trivia_sw=debug,reqwest=warn"`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            include_location: false,
            include_span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// From the `logging` section of a config file.
    ///
    /// Unknown levels fall back to `INFO` and unknown formats to `Pretty`.
    pub fn from_settings(level: &str, format: &str, filter: Option<&str>) -> Self {
        Self {
            level: Level::from_str(level).unwrap_or(Level::INFO),
            format: format.parse().unwrap_or_default(),
            filter: filter.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Explicit filter first, then `RUST_LOG`, then the plain level.
    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(self.span_events());

        match self.format {
            LogFormat::Pretty => base
                .with_file(self.include_location)
                .with_line_number(self.include_location)
                .boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if one is already installed.
pub fn init_logging(config: LogConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.fmt_layer().with_filter(config.env_filter()))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_settings() {
        let config = LogConfig::from_settings("debug", "json", Some("trivia_sw=trace"));
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("trivia_sw=trace"));
    }

    #[test]
    fn test_from_unknown_settings() {
        let config = LogConfig::from_settings("loud", "fancy", None);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_bad_filter_falls_back_to_level() {
        let config = LogConfig::from_settings("warn", "pretty", Some("trivia_sw=[[["));
        assert_eq!(
            config.env_filter().max_level_hint(),
            Some(tracing::level_filters::LevelFilter::WARN)
        );
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logging(LogConfig::default());
        assert!(init_logging(LogConfig::default().with_filter("trivia_leaderboard=debug")).is_err());
    }
}
