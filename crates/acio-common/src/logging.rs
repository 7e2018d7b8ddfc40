//! Logging Configuration and Initialization
//!
//! This module provides the process-wide logging setup for every ACIO binary.
//! It supports:
//!
//! - Multiple output targets (console, files, both)
//! - Multiple log formats (text, JSON)
//! - Configurable log levels and per-module filter directives
//! - Severity-routed log files: application, errors only, and HTTP access
//! - Size-based file rotation with a bounded number of kept files, optionally
//!   combined with a time schedule
//! - Environment-based configuration
//!
//! # Best Practices
//!
//! 1. **NEVER use `println!`, `eprintln!`, or `dbg!` macros**
//!    - Use structured logging macros instead: `trace!`, `debug!`, `info!`, `warn!`, `error!`
//!
//! 2. **Attach request-scoped data with spans, not globals**:
//!    ```rust,ignore
//!    use tracing::{info, info_span, Instrument};
//!
//!    async move { info!("handled") }
//!        .instrument(info_span!("request", request_id = %id))
//!        .await;
//!    ```
//!
//! 3. **Send HTTP access lines to the access target** so they land in the access file:
//!    ```rust
//!    use acio_common::logging::ACCESS_LOG_TARGET;
//!
//!    tracing::info!(target: ACCESS_LOG_TARGET, "GET / 200 17 - 0.412 ms");
//!    ```
//!
//! # Example
//!
//! ```no_run
//! use acio_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic, RollingFrequency};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Target used for HTTP access lines; routed to the access log file.
pub const ACCESS_LOG_TARGET: &str = "acio::access";

/// Default number of rotated files kept per log stream.
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Default size at which a log file rolls over (10 MiB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// The error stream never keeps more than this many rotated files.
const ERROR_STREAM_MAX_FILES: usize = 3;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed trace-level logging
    Trace,
    /// Debug-level logging for development
    Debug,
    /// Informational messages
    #[default]
    Info,
    /// Warning messages
    Warn,
    /// Error messages
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            // `http` and `verbose` are the access-log levels of older deployments
            "debug" | "http" | "verbose" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Output target for logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Output to console only
    #[default]
    Console,
    /// Output to the log files only
    File,
    /// Output to both console and the log files
    Both,
}

impl LogOutput {
    fn writes_console(&self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn writes_files(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(anyhow::anyhow!("Invalid log output: {}", s)),
        }
    }
}

impl std::fmt::Display for LogOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogOutput::Console => write!(f, "console"),
            LogOutput::File => write!(f, "file"),
            LogOutput::Both => write!(f, "both"),
        }
    }
}

/// Log format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Time schedule that rolls log files over in addition to the size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    #[default]
    Never,
}

impl LogRotation {
    fn to_frequency(self) -> Option<RollingFrequency> {
        match self {
            LogRotation::Minutely => Some(RollingFrequency::EveryMinute),
            LogRotation::Hourly => Some(RollingFrequency::EveryHour),
            LogRotation::Daily => Some(RollingFrequency::EveryDay),
            LogRotation::Never => None,
        }
    }
}

impl std::str::FromStr for LogRotation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minutely" => Ok(LogRotation::Minutely),
            "hourly" => Ok(LogRotation::Hourly),
            "daily" => Ok(LogRotation::Daily),
            "never" | "none" => Ok(LogRotation::Never),
            _ => Err(anyhow::anyhow!("Invalid log rotation: {}", s)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,

    /// Output target (console, file, or both)
    pub output: LogOutput,

    /// Log format (text or JSON)
    pub format: LogFormat,

    /// Directory for log files (only used when output includes file)
    pub log_dir: PathBuf,

    /// Log file name prefix. The application stream is `<prefix>.log`, the
    /// error stream `<prefix>-error.log` and the access stream
    /// `<prefix>-access.log`. Rolled files get a `.1`, `.2`, ... suffix.
    pub log_file_prefix: String,

    /// Size in bytes at which the application and access files roll over.
    /// The error file rolls at half this size.
    pub max_file_size: u64,

    /// Number of rotated files kept per stream (at most 3 for errors)
    pub max_log_files: usize,

    /// Optional time schedule on top of the size limit
    pub rotation: LogRotation,

    /// Additional filter directives (e.g., "sqlx=warn,tower_http=debug")
    /// This allows fine-tuning specific module log levels
    pub filter_directives: Option<String>,

    /// Whether to include file and line number in logs
    pub include_location: bool,

    /// Whether to include thread IDs in logs
    pub include_thread_ids: bool,

    /// Whether to include target module names in logs
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "app".to_string(),
            max_file_size: DEFAULT_MAX_LOG_SIZE,
            max_log_files: DEFAULT_MAX_LOG_FILES,
            rotation: LogRotation::Never,
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LOG_LEVEL`: Log level (trace, debug, info, warn, error)
    /// - `LOG_OUTPUT`: Output target (console, file, both)
    /// - `LOG_FORMAT`: Log format (text, json)
    /// - `LOG_DIR`: Directory for log files
    /// - `LOG_FILE_PREFIX`: Prefix for log files
    /// - `LOG_FILE`: Application log path; sets both directory and prefix
    /// - `LOG_MAX_SIZE`: Roll-over size (`10m`, `512k`, `1g` or plain bytes)
    /// - `LOG_MAX_FILES`: Rotated files kept per stream
    /// - `LOG_ROTATION`: Extra time schedule (minutely, hourly, daily, never)
    /// - `LOG_FILTER`: Additional filter directives
    /// - `LOG_INCLUDE_LOCATION`: Include file/line in logs (true/false)
    /// - `LOG_INCLUDE_THREAD_IDS`: Include thread IDs (true/false)
    /// - `LOG_INCLUDE_TARGETS`: Include module targets (true/false)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level.parse()?;
        }

        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            config.output = output.parse()?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            config.log_file_prefix = prefix;
        }

        if let Ok(file) = std::env::var("LOG_FILE") {
            config.set_log_file(Path::new(&file));
        }

        if let Ok(size) = std::env::var("LOG_MAX_SIZE") {
            config.max_file_size = parse_size(&size)?;
        }

        if let Ok(rotation) = std::env::var("LOG_ROTATION") {
            config.rotation = rotation.parse()?;
        }

        if let Ok(val) = std::env::var("LOG_MAX_FILES") {
            config.max_log_files = val.parse().unwrap_or(DEFAULT_MAX_LOG_FILES);
        }

        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_LOCATION") {
            config.include_location = val.parse().unwrap_or(false);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_THREAD_IDS") {
            config.include_thread_ids = val.parse().unwrap_or(false);
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_TARGETS") {
            config.include_targets = val.parse().unwrap_or(true);
        }

        Ok(config)
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Split `./logs/app.log` into the directory and the `app` prefix
    fn set_log_file(&mut self, file: &Path) {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.log_dir = parent.to_path_buf();
        }
        if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
            self.log_file_prefix = stem.to_string();
        }
    }
}

/// Parse a file size such as `10m`, `512k`, `1g` or `2048`
pub fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim().to_lowercase();
    let value = value.strip_suffix('b').unwrap_or(&value);
    let (digits, multiplier) = match value.char_indices().last() {
        Some((i, 'k')) => (&value[..i], 1024),
        Some((i, 'm')) => (&value[..i], 1024 * 1024),
        Some((i, 'g')) => (&value[..i], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    let size: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid log file size: {}", value))?;
    if size == 0 {
        anyhow::bail!("Log file size must be greater than zero");
    }
    Ok(size.saturating_mul(multiplier))
}

/// Builder for LogConfig
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn log_file(mut self, file: impl AsRef<Path>) -> Self {
        self.config.set_log_file(file.as_ref());
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn max_log_files(mut self, max: usize) -> Self {
        self.config.max_log_files = max;
        self
    }

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn include_location(mut self, include: bool) -> Self {
        self.config.include_location = include;
        self
    }

    pub fn include_thread_ids(mut self, include: bool) -> Self {
        self.config.include_thread_ids = include;
        self
    }

    pub fn include_targets(mut self, include: bool) -> Self {
        self.config.include_targets = include;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the background file writers alive.
///
/// Dropping the guard flushes buffered lines, so hold it until the process is
/// about to exit and drop it explicitly before calling `std::process::exit`.
#[must_use = "dropping the guard stops the file writers"]
pub struct LoggingGuard {
    _workers: Vec<WorkerGuard>,
}

/// Initialize logging with the given configuration
///
/// This sets up the global tracing subscriber. It should only be called once
/// at application startup; a second call fails.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut workers = Vec::new();

    if config.output.writes_console() {
        layers.push(
            fmt_layer(config, std::io::stdout, true)
                .with_filter(build_filter(config)?)
                .boxed(),
        );
    }

    if config.output.writes_files() {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

        let app_limits = StreamLimits::new(config.max_file_size, config.max_log_files);
        let (app, guard) = file_writer(config, &config.log_file_prefix, app_limits)?;
        workers.push(guard);
        layers.push(
            fmt_layer(config, app, false)
                .with_filter(build_filter(config)?)
                .boxed(),
        );

        let error_limits = StreamLimits::new(
            config.max_file_size / 2,
            config.max_log_files.min(ERROR_STREAM_MAX_FILES),
        );
        let (errors, guard) =
            file_writer(config, &format!("{}-error", config.log_file_prefix), error_limits)?;
        workers.push(guard);
        layers.push(fmt_layer(config, errors, false).with_filter(LevelFilter::ERROR).boxed());

        let (access, guard) =
            file_writer(config, &format!("{}-access", config.log_file_prefix), app_limits)?;
        workers.push(guard);
        layers.push(
            fmt_layer(config, access, false)
                .with_filter(Targets::new().with_target(ACCESS_LOG_TARGET, Level::INFO))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    Ok(LoggingGuard { _workers: workers })
}

/// Build the level filter shared by the console and application streams
fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .context("Failed to parse filter directive")?,
            );
        }
    }

    Ok(filter)
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Roll-over size and retention for one file stream
#[derive(Debug, Clone, Copy)]
struct StreamLimits {
    max_size: u64,
    max_files: usize,
}

impl StreamLimits {
    fn new(max_size: u64, max_files: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            max_files: max_files.max(1),
        }
    }
}

/// Create a size-rotated, non-blocking file writer for one log stream
fn file_writer(
    config: &LogConfig,
    prefix: &str,
    limits: StreamLimits,
) -> Result<(NonBlocking, WorkerGuard)> {
    let mut condition = RollingConditionBasic::new().max_size(limits.max_size);
    if let Some(frequency) = config.rotation.to_frequency() {
        condition = condition.frequency(frequency);
    }

    let path = config.log_dir.join(format!("{}.log", prefix));
    let appender = BasicRollingFileAppender::new(&path, condition, limits.max_files)
        .with_context(|| format!("Failed to open log file '{}'", path.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("http".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("console".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("file".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("invalid".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_rotation_from_str() {
        assert_eq!("hourly".parse::<LogRotation>().unwrap(), LogRotation::Hourly);
        assert_eq!("NONE".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_output_routing() {
        assert!(LogOutput::Console.writes_console());
        assert!(!LogOutput::Console.writes_files());
        assert!(LogOutput::Both.writes_console());
        assert!(LogOutput::Both.writes_files());
        assert!(!LogOutput::File.writes_console());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .format(LogFormat::Json)
            .log_dir("/var/log/acio")
            .log_file_prefix("test")
            .rotation(LogRotation::Hourly)
            .max_file_size(4096)
            .max_log_files(3)
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/acio"));
        assert_eq!(config.log_file_prefix, "test");
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert_eq!(config.max_file_size, 4096);
        assert_eq!(config.max_log_files, 3);
    }

    #[test]
    fn test_default_rotation_is_size_only() {
        let config = LogConfig::default();
        assert_eq!(config.max_file_size, DEFAULT_MAX_LOG_SIZE);
        assert_eq!(config.rotation, LogRotation::Never);
        assert!(config.rotation.to_frequency().is_none());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10m").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("512K").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1gb").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size(" 2048 ").unwrap(), 2048);
        assert!(parse_size("0").is_err());
        assert!(parse_size("ten megs").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn test_log_file_sets_directory_and_prefix() {
        let config = LogConfig::builder().log_file("/var/log/acio/server.log").build();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/acio"));
        assert_eq!(config.log_file_prefix, "server");

        let config = LogConfig::builder().log_file("acio.log").build();
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.log_file_prefix, "acio");
    }

    #[test]
    fn test_file_stream_rolls_over_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::builder()
            .output(LogOutput::File)
            .log_dir(dir.path())
            .log_file_prefix("rolling")
            .build();

        let (writer, guard) = file_writer(&config, "rolling", StreamLimits::new(256, 2)).unwrap();
        let subscriber = Registry::default().with(fmt_layer(&config, writer, false));
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..100 {
                tracing::info!(line = i, "filling the application log past its size limit");
            }
        });
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n == "rolling.log"));
        assert!(names.iter().any(|n| n == "rolling.log.1"));
        // dozens of roll-overs, only a handful of files kept
        assert!(names.len() <= 4, "kept {names:?}");

        let current = std::fs::metadata(dir.path().join("rolling.log")).unwrap();
        assert!(current.len() < 1024);
    }

    #[test]
    fn test_invalid_filter_directive_is_rejected() {
        let config = LogConfig::builder()
            .filter_directives("sqlx=warn,[[not a directive")
            .build();
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_init_logging_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");
        let config = LogConfig::builder()
            .output(LogOutput::File)
            .log_dir(&log_dir)
            .build();

        let guard = init_logging(&config).unwrap();
        tracing::error!("written to the error stream");
        drop(guard);

        assert!(log_dir.is_dir());
        let names: Vec<String> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("app-error")));
        assert!(names.iter().any(|n| n.starts_with("app-access")));
    }
}
