//! Logging configuration and subscriber setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::{TelemetryError, TelemetryResult};

/// How often file output rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// Once a day.
    #[default]
    Daily,
    /// Once an hour.
    Hourly,
    /// Never.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// Single line.
    Compact,
    /// One JSON object per event.
    Json,
    /// Single line with span context.
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Rolling files in this directory.
    File(PathBuf),
}

/// Rolling file settings, used with [`LogTarget::File`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// File name prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Rollover period.
    #[serde(default)]
    pub rotation: FileRotation,
    /// Files kept after rollover; 0 keeps all.
    #[serde(default)]
    pub max_files: usize,
}

fn default_prefix() -> String {
    "procura".to_string()
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            rotation: FileRotation::default(),
            max_files: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base filter, e.g. `info`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
    /// Destination.
    #[serde(default)]
    pub target: LogTarget,
    /// Rolling file settings.
    #[serde(default)]
    pub file: FileLogConfig,
    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Include source file and line.
    #[serde(default)]
    pub file_info: bool,
    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
    /// Color output. Always off for files.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Extra filter directives such as `procura_access=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file: FileLogConfig::default(),
            timestamps: true,
            file_info: false,
            span_events: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Config with the given base level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to rolling files under `directory`.
    #[must_use]
    pub fn with_file_logging(
        mut self,
        directory: impl Into<PathBuf>,
        rotation: FileRotation,
    ) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file.rotation = rotation;
        self.ansi = false;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Log span open and close.
    #[must_use]
    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let directive = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("{directive}: {e}"))
                })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn make_writer(&self) -> TelemetryResult<BoxMakeWriter> {
        match &self.target {
            LogTarget::Stdout => Ok(BoxMakeWriter::new(std::io::stdout)),
            LogTarget::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
            LogTarget::File(dir) => {
                std::fs::create_dir_all(dir)?;
                let mut builder = RollingFileAppender::builder()
                    .rotation(self.file.rotation.into())
                    .filename_prefix(&self.file.prefix)
                    .filename_suffix("log");
                if self.file.max_files > 0 {
                    builder = builder.max_log_files(self.file.max_files);
                }
                let appender = builder
                    .build(dir)
                    .map_err(|e| TelemetryError::InitError(e.to_string()))?;
                Ok(BoxMakeWriter::new(appender))
            },
        }
    }

    fn fmt_layer<S>(&self, writer: BoxMakeWriter) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let span_events = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let ansi = self.ansi && !matches!(self.target, LogTarget::File(_));
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_span_events(span_events);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for a bad level or directive,
/// [`TelemetryError::IoError`] if the log directory cannot be created, and
/// [`TelemetryError::InitError`] if a subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;
    let writer = config.make_writer()?;
    tracing_subscriber::registry()
        .with(filter)
        .with(config.fmt_layer(writer))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

/// Install the default subscriber: `info`, pretty, stderr.
///
/// # Errors
///
/// Returns [`TelemetryError::InitError`] if a subscriber is already installed.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.target, LogTarget::Stderr);
        assert_eq!(config.file.prefix, "procura");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.timestamps);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_filter_directives() {
        let config = LogConfig::new("info").with_directive("procura_pipeline=trace");
        assert!(config.build_filter().is_ok());

        let config = LogConfig::new("info").with_directive("[bad=syntax");
        assert!(matches!(
            config.build_filter(),
            Err(TelemetryError::ConfigError(_))
        ));
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LogConfig::default().with_file_logging(&logs, FileRotation::Never);
        assert!(!config.ansi);
        assert!(config.make_writer().is_ok());
        assert!(logs.is_dir());
    }
}
