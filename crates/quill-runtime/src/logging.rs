//! Log output for quill bots.
//!
//! Every message the dispatcher looks at gets its own `dispatch` span
//! (channel and sender attached), so turning on [`SpanEvents::LIFECYCLE`]
//! prints one open/close pair per message, with the close line carrying
//! how long the command took. Queue and store activity log under the
//! `quill_core` target, commands under `quill_framework`.
//!
//! Bots that load a [`QuillConfig`](crate::QuillConfig) get logging from its
//! `[logging]` table:
//!
//! ```rust,ignore
//! let config = quill_runtime::config::load_config()?;
//! quill_runtime::logging::init_from_config(&config.logging);
//! ```
//!
//! Scripts and demos usually set it up by hand:
//!
//! ```rust,ignore
//! use quill_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("quill_core=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

/// Fallback when `logging.file_path` has no file name component.
const DEFAULT_LOG_FILE: &str = "quill.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Span transitions that produce a log line of their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    /// The close line includes busy and idle time.
    pub close: bool,
}

impl SpanEvents {
    /// Spans stay silent; only events inside them are logged.
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Open and close lines: one pair per dispatched message.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// Also logs every poll of a handler future, which is noisy.
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(FmtSpan::NONE, |flags, (_, flag)| flags | flag)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

// =============================================================================
// Configuration-Based Initialization
// =============================================================================

/// Installs the global subscriber described by `config`.
///
/// The first runtime in a process wins; later calls leave the installed
/// subscriber alone.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

// =============================================================================
// LoggingBuilder
// =============================================================================

/// Assembles the global subscriber: one fmt layer behind an [`EnvFilter`].
#[derive(Debug, Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<tracing::Level>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    target: bool,
    thread_ids: bool,
    source_location: bool,
    file_path: Option<PathBuf>,
}

impl LoggingBuilder {
    /// Compact lines on stdout at `info`, each tagged with its target.
    pub fn new() -> Self {
        Self {
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            target: true,
            ..Default::default()
        }
    }

    /// Mirrors a `[logging]` table. Per-target filters become directives,
    /// sorted by target so the resulting filter does not depend on map order.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut targets: Vec<_> = config.filters.iter().collect();
        targets.sort_by(|a, b| a.0.cmp(b.0));

        Self {
            directives: targets
                .into_iter()
                .map(|(target, level)| format!("{target}={}", level.as_str()))
                .collect(),
            level: Some(config.level.to_tracing_level()),
            span_events: SpanEvents::from(&config.span_events),
            format: config.format,
            output: config.output,
            target: true,
            thread_ids: config.thread_ids,
            source_location: config.file_location,
            file_path: config.file_path.clone(),
        }
    }

    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Adds a directive such as `quill_framework=trace`. Malformed
    /// directives are reported on stderr at init and skipped.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Prefixes each line with the file and line that logged it.
    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.source_location = enabled;
        self
    }

    /// Where [`LogOutput::File`] writes. The file is appended to, never
    /// rotated.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// `RUST_LOG`, when set, replaces the base level; directives apply on top.
    fn build_filter(&self) -> EnvFilter {
        let base = self
            .level
            .unwrap_or(tracing::Level::INFO)
            .to_string()
            .to_lowercase();

        self.directives.iter().fold(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base)),
            |filter, directive| match directive.parse() {
                Ok(d) => filter.add_directive(d),
                Err(_) => {
                    eprintln!("ignoring invalid log directive: {directive}");
                    filter
                }
            },
        )
    }

    fn fmt_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events.to_fmt_span())
            .with_target(self.target)
            .with_thread_ids(self.thread_ids)
            .with_file(self.source_location)
            .with_line_number(self.source_location);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    fn output_layer(&self) -> BoxedLayer {
        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => self.fmt_layer(std::io::stdout),
            (LogOutput::Stderr, _) => self.fmt_layer(std::io::stderr),
            (LogOutput::File, Some(path)) => {
                let (dir, file) = split_log_path(path);
                self.fmt_layer(tracing_appender::rolling::never(dir, file))
            }
            (LogOutput::File, None) => {
                eprintln!("file logging requested without a file path; using stdout");
                self.fmt_layer(std::io::stdout)
            }
        }
    }

    /// Installs the subscriber unless one is already installed.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber, failing if one is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.output_layer())
            .with(self.build_filter())
            .try_init()
    }
}

/// Splits a log path into the directory and file name the appender wants.
/// A bare file name logs into the working directory.
fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    (dir, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_from_config_collects_sorted_directives() {
        let mut config = LoggingConfig::default();
        config.level = LogLevel::Warn;
        config.filters.insert("quill_framework".into(), LogLevel::Trace);
        config.filters.insert("quill_core".into(), LogLevel::Debug);
        config.span_events.close = true;

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Some(tracing::Level::WARN));
        assert_eq!(
            builder.directives(),
            ["quill_core=debug", "quill_framework=trace"]
        );
        assert_eq!(
            builder.span_events,
            SpanEvents {
                close: true,
                ..SpanEvents::NONE
            }
        );
    }

    #[test]
    fn test_log_path_is_split_for_the_appender() {
        assert_eq!(
            split_log_path(Path::new("logs/notes.log")),
            (Path::new("logs"), OsStr::new("notes.log"))
        );
        assert_eq!(
            split_log_path(Path::new("notes.log")),
            (Path::new("."), OsStr::new("notes.log"))
        );
        assert_eq!(
            split_log_path(Path::new("/")),
            (Path::new("."), OsStr::new(DEFAULT_LOG_FILE))
        );
    }

    #[test]
    fn test_span_event_flags() {
        assert_eq!(SpanEvents::NONE.to_fmt_span(), fmt::format::FmtSpan::NONE);
        assert_eq!(SpanEvents::FULL.to_fmt_span(), fmt::format::FmtSpan::FULL);
    }
}
