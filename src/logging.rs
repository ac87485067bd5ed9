//! Logging setup for the bridge
//!
//! Every boundary crossing (metadata load, synthesis, wrapper lifetime,
//! native calls, queue traffic) emits a `tracing` event with an `event`
//! field. This module installs the subscriber that renders them.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with timestamps
    #[default]
    Pretty,
    /// Single-line format
    Compact,
    /// JSON lines for log collectors
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rolling file
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g. "metabridge=debug,metabridge_runtime=warn")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Install the global subscriber
///
/// Returns the appender guard; logs are flushed when it drops, so keep it
/// alive for the life of the process. Installing twice leaves the first
/// subscriber in place.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    install(&config, writer);
    Some(guard)
}

fn install<W>(config: &LogConfig, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = build_filter(config);
    let spans = span_events_config(config.span_events);

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .pretty()
                .with_span_events(spans)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .with_writer(writer)
                .compact()
                .with_span_events(spans)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(spans)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
    };

    if result.is_err() {
        tracing::debug!(event = "logging_already_installed", "subscriber already set");
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Development defaults: pretty output on stderr, debug level
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("metabridge=debug".to_string()),
    })
}

/// Production defaults: JSON into a daily rolling file
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "metabridge".to_string(),
        },
        span_events: false,
        filter: Some("metabridge=info,metabridge_runtime=warn".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("metabridge=trace");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter, Some("metabridge=trace".to_string()));
    }

    #[test]
    fn test_format_names() {
        let format: LogFormat = serde_json::from_str("\"compact\"").unwrap();
        assert_eq!(format, LogFormat::Compact);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
