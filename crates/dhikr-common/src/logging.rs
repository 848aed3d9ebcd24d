//! Logging configuration and setup.
//!
//! The worker logs routing decisions at `debug`, lifecycle transitions at
//! `info` and swallowed failures at `warn`. HTTP plumbing crates are noisy at
//! those levels, so they are held at `warn` unless a filter says otherwise.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{DhikrError, Result};

/// Crates whose output is capped at `warn` by default.
const QUIET_CRATES: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls", "tower_http"];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the dhikr crates.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Include source file and line.
    pub include_location: bool,
    /// Emit span enter/close events.
    pub include_span_events: bool,
    /// Explicit filter directives; wins over `RUST_LOG`.
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
    /// Configuration for a host process.
    pub fn for_host(debug: bool, format: LogFormat) -> Self {
        let config = if debug {
            Self {
                level: Level::DEBUG,
                include_location: true,
                include_span_events: true,
                ..Default::default()
            }
        } else {
            Self::default()
        };
        config.with_format(format)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directives used when neither a filter nor `RUST_LOG` is given.
    pub fn default_directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        let mut directives = vec![level];
        directives.extend(QUIET_CRATES.iter().map(|name| format!("{name}=warn")));
        directives.join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if let Some(filter) = &self.filter {
            return EnvFilter::try_new(filter)
                .map_err(|e| DhikrError::config_with_source(format!("bad log filter {filter:?}"), e));
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives())))
    }
}

/// Install the global subscriber. Fails if one is already installed or the
/// explicit filter does not parse.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true).with_span_events(span_events))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init(),
    };
    installed.map_err(|e| DhikrError::config(format!("logging already initialized: {e}")))
}
