//! # Logging & Tracing Infrastructure
//!
//! The decoding crates only emit events through `tracing` macros. Hosts
//! (binaries, test harnesses) call [`init_logging`] once at startup to decide
//! where those events go and in which shape.
//!
//! Output goes to stderr by default. Decoded PCM is commonly piped through
//! stdout and must not be interleaved with log lines.
//!
//! ## Environment overrides
//!
//! [`LoggingConfig::from_env`] starts from the defaults and applies:
//!
//! - `PCMTAP_LOG`: a full `EnvFilter` directive string, e.g.
//!   `core_decode=trace,symphonia=info`
//! - `PCMTAP_LOG_FORMAT`: `pretty`, `json` or `compact`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::from_env()?.with_level(LogLevel::Debug);
//! init_logging(config)?;
//! tracing::info!("decoder host started");
//! ```

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::io;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Filter directive override.
pub const FILTER_ENV: &str = "PCMTAP_LOG";
/// Output format override.
pub const FORMAT_ENV: &str = "PCMTAP_LOG_FORMAT";

/// Crates whose events follow [`LoggingConfig::level`] when no custom filter
/// is given. Everything else is held at `warn`.
const OWN_TARGETS: &[&str] = &["pcmtap", "core_runtime", "core_decode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Compact;
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("unknown log format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(Error::Config(format!("unknown log level '{}'", other))),
        }
    }
}

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    #[default]
    Stderr,
    Stdout,
}

impl LogSink {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            LogSink::Stderr => BoxMakeWriter::new(io::stderr),
            LogSink::Stdout => BoxMakeWriter::new(io::stdout),
        }
    }
}

/// Subscriber settings. Deserializable so hosts can keep it next to their
/// decode settings; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for this workspace's crates.
    pub level: LogLevel,
    /// Full directive string, replaces the level-derived filter.
    pub filter: Option<String>,
    /// Emit span open/close events (one span per backend attempt).
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
    pub sink: LogSink,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: false,
            display_target: true,
            display_thread_info: false,
            sink: LogSink::Stderr,
        }
    }
}

impl LoggingConfig {
    /// Defaults plus the `PCMTAP_LOG` / `PCMTAP_LOG_FORMAT` overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(filter) = set(FILTER_ENV) {
            self.filter = Some(filter);
        }
        if let Some(format) = set(FORMAT_ENV) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = sink;
        self
    }
}

/// Install the global subscriber.
///
/// Call once per process. The filter is validated before anything is
/// installed, so a bad filter leaves the process free to retry.
///
/// # Errors
///
/// - [`Error::InvalidFilter`] if the filter string does not parse
/// - [`Error::AlreadyInitialized`] if a global subscriber already exists
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .try_init()
        .map_err(|e| Error::AlreadyInitialized(e.to_string()))
}

fn filter_directives(config: &LoggingConfig) -> String {
    match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let mut directives = vec!["warn".to_string()];
            directives.extend(
                OWN_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, config.level.as_str())),
            );
            directives.join(",")
        }
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = filter_directives(config);
    EnvFilter::try_new(&directives).map_err(|e| Error::InvalidFilter {
        filter: directives,
        reason: e.to_string(),
    })
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer(config: &LoggingConfig) -> BoxedLayer {
    let spans = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(config.sink.make_writer());

    match config.format {
        LogFormat::Pretty => Box::new(layer.pretty().with_span_events(spans)),
        LogFormat::Compact => Box::new(layer.compact().with_span_events(spans)),
        LogFormat::Json => Box::new(
            layer
                .json()
                .flatten_event(true)
                .with_current_span(config.enable_spans)
                .with_span_list(config.enable_spans),
        ),
    }
}

/// Last path component, for logging file names without the user's
/// directory layout. Handles both `/` and `\` separators.
///
/// ```ignore
/// use core_runtime::logging::strip_path;
///
/// tracing::info!(file = %strip_path("/home/me/Music/tone.wav"), "opening");
/// // file="tone.wav"
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
