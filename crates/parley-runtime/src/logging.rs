//! Installing a `tracing` subscriber from `[logging]` settings.
//!
//! The router only emits events. [`ParleyRuntime`](crate::ParleyRuntime)
//! installs a subscriber from its configuration; programs that want one
//! without a runtime can use [`LoggingBuilder`].
//!
//! ```rust,ignore
//! LoggingBuilder::new()
//!     .directive("parley_router=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```
//!
//! [`SpanEvents::LIFECYCLE`] logs the open and close of each `dispatch` span,
//! which carries its busy and idle time.

use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

const FALLBACK_FILE_NAME: &str = "parley.log";

/// Span transitions written as log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    const fn of(new: bool, enter: bool, exit: bool, close: bool) -> Self {
        Self {
            new,
            enter,
            exit,
            close,
        }
    }

    pub const NONE: Self = Self::of(false, false, false, false);
    /// Open and close.
    pub const LIFECYCLE: Self = Self::of(true, false, false, true);
    /// Every enter and exit of a span, e.g. around each `.await`.
    pub const ACTIVE: Self = Self::of(false, true, true, false);
    pub const FULL: Self = Self::of(true, true, true, true);

    fn fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter_map(|(on, flag)| on.then_some(flag))
        .fold(FmtSpan::NONE, |acc, flag| acc | flag)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(c: &SpanEventConfig) -> Self {
        Self::of(c.new, c.enter, c.exit, c.close)
    }
}

impl From<SpanEvents> for SpanEventConfig {
    fn from(e: SpanEvents) -> Self {
        Self {
            new: e.new,
            enter: e.enter,
            exit: e.exit,
            close: e.close,
        }
    }
}

/// Installs a subscriber for `config`. A subscriber that is already set
/// is left in place.
pub fn init_from_config(config: &LoggingConfig) {
    LoggingBuilder::from_config(config).init();
}

/// Builds the process-wide subscriber: an [`EnvFilter`] over one fmt layer.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    extra_directives: Vec<String>,
    show_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact lines at `info` on stdout.
    pub fn new() -> Self {
        Self::from_config(&LoggingConfig::default())
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            config: config.clone(),
            extra_directives: Vec::new(),
            show_target: true,
        }
    }

    /// Level used when `RUST_LOG` is not set.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a directive such as `parley_router=trace`. Applied after the
    /// per-target `filters` table.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.config.span_events = events.into();
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Writes to `path` instead of a standard stream.
    pub fn file(mut self, path: impl AsRef<Path>, rotation: LogRotation) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.as_ref().to_owned());
        self.config.rotation = rotation;
        self
    }

    pub fn show_target(mut self, on: bool) -> Self {
        self.show_target = on;
        self
    }

    pub fn thread_ids(mut self, on: bool) -> Self {
        self.config.thread_ids = on;
        self
    }

    /// Source file and line of each event.
    pub fn file_location(mut self, on: bool) -> Self {
        self.config.file_location = on;
        self
    }

    /// Filter directives in the order they are applied: the `filters` table
    /// sorted by target, then those added with [`directive`](Self::directive).
    fn directives(&self) -> Vec<String> {
        let mut table: Vec<_> = self
            .config
            .filters
            .iter()
            .map(|(target, level)| format!("{target}={level}"))
            .collect();
        table.sort();
        table.extend(self.extra_directives.iter().cloned());
        table
    }

    fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));

        self.directives()
            .into_iter()
            .fold(base, |filter, directive| match directive.parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(e) => {
                    // No subscriber yet, so stderr is the only place to say so.
                    eprintln!("parley: skipping log directive {directive:?}: {e}");
                    filter
                }
            })
    }

    /// The writer, and whether file output fell back to stdout.
    fn writer(&self) -> (BoxMakeWriter, bool) {
        match (self.config.output, self.config.file_path.as_deref()) {
            (LogOutput::Stdout, _) => (BoxMakeWriter::new(std::io::stdout), false),
            (LogOutput::Stderr, _) => (BoxMakeWriter::new(std::io::stderr), false),
            (LogOutput::File, Some(path)) => {
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let name = path
                    .file_name()
                    .unwrap_or_else(|| OsStr::new(FALLBACK_FILE_NAME));
                let appender = match self.config.rotation {
                    LogRotation::Never => rolling::never(dir, name),
                    LogRotation::Hourly => rolling::hourly(dir, name),
                    LogRotation::Daily => rolling::daily(dir, name),
                };
                (BoxMakeWriter::new(appender), false)
            }
            (LogOutput::File, None) => (BoxMakeWriter::new(std::io::stdout), true),
        }
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(SpanEvents::from(&self.config.span_events).fmt_span())
            .with_target(self.show_target)
            .with_thread_ids(self.config.thread_ids)
            .with_file(self.config.file_location)
            .with_line_number(self.config.file_location);

        match self.config.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    /// Like [`try_init`](Self::try_init), ignoring an existing subscriber.
    pub fn init(self) {
        let _ = self.try_init();
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        let (writer, fell_back) = self.writer();
        tracing_subscriber::registry()
            .with(self.fmt_layer(writer))
            .with(self.env_filter())
            .try_init()?;

        if fell_back {
            warn!("logging.output is \"file\" but logging.file_path is unset; writing to stdout");
        }
        Ok(())
    }
}
