//! Process-wide logging for UHPM.
//!
//! # Responsibility
//! - Start the rolling file logger under `<base>/logs` once per process.
//! - Optionally echo log lines to stderr for interactive use.
//! - Record panics as `event=panic_captured` before the default hook runs.
//!
//! # Invariants
//! - A second `init_logging*` call with the same options is a no-op; any
//!   other options are rejected with `LoggingError::AlreadyActive`.
//! - Starting the logger never panics.
//! - Log lines carry package names, versions and paths, never file contents.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "uhpm";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parses a level name; `warning` is accepted for `warn`.
    pub fn parse(value: &str) -> Result<Self, LoggingError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::InvalidLevel(value.trim().to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    fn duplicate(self) -> Duplicate {
        match self {
            Self::Trace => Duplicate::Trace,
            Self::Debug => Duplicate::Debug,
            Self::Info => Duplicate::Info,
            Self::Warn => Duplicate::Warn,
            Self::Error => Duplicate::Error,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> LogLevel {
    if cfg!(debug_assertions) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel(String),
    RelativeDirectory(PathBuf),
    CreateDirectory { path: PathBuf, source: std::io::Error },
    Backend(String),
    AlreadyActive { active: String, requested: String },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeDirectory(path) => {
                write!(f, "log directory must be absolute: `{}`", path.display())
            }
            Self::CreateDirectory { path, source } => {
                write!(f, "cannot create log directory `{}`: {source}", path.display())
            }
            Self::Backend(message) => write!(f, "cannot start logger: {message}"),
            Self::AlreadyActive { active, requested } => write!(
                f,
                "logging already active with {active}; refusing to switch to {requested}"
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub level: LogLevel,
    pub log_dir: PathBuf,
    /// Also write lines at or above this level to stderr.
    pub echo_to_stderr: Option<LogLevel>,
}

impl LoggingOptions {
    pub fn new(level: LogLevel, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level,
            log_dir: log_dir.into(),
            echo_to_stderr: None,
        }
    }

    pub fn echo(mut self, level: LogLevel) -> Self {
        self.echo_to_stderr = Some(level);
        self
    }

    fn describe(&self) -> String {
        match self.echo_to_stderr {
            Some(echo) => format!(
                "level={} dir={} echo={echo}",
                self.level,
                self.log_dir.display()
            ),
            None => format!("level={} dir={}", self.level, self.log_dir.display()),
        }
    }
}

/// What the running logger was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingStatus {
    pub level: LogLevel,
    pub log_dir: PathBuf,
}

struct ActiveLogger {
    options: LoggingOptions,
    _handle: LoggerHandle,
}

/// Starts file logging at `level` under `log_dir`.
pub fn init_logging(level: LogLevel, log_dir: &Path) -> Result<(), LoggingError> {
    init_logging_with(&LoggingOptions::new(level, log_dir))
}

/// Starts file logging with explicit options.
///
/// # Errors
/// - `RelativeDirectory` when `log_dir` is not absolute.
/// - `CreateDirectory` or `Backend` when the logger cannot start.
/// - `AlreadyActive` when another configuration is already running.
pub fn init_logging_with(options: &LoggingOptions) -> Result<(), LoggingError> {
    if !options.log_dir.is_absolute() {
        return Err(LoggingError::RelativeDirectory(options.log_dir.clone()));
    }

    let active = ACTIVE.get_or_try_init(|| start_logger(options))?;
    if active.options != *options {
        return Err(LoggingError::AlreadyActive {
            active: active.options.describe(),
            requested: options.describe(),
        });
    }
    Ok(())
}

pub fn logging_status() -> Option<LoggingStatus> {
    ACTIVE.get().map(|active| LoggingStatus {
        level: active.options.level,
        log_dir: active.options.log_dir.clone(),
    })
}

fn start_logger(options: &LoggingOptions) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&options.log_dir).map_err(|source| {
        LoggingError::CreateDirectory {
            path: options.log_dir.clone(),
            source,
        }
    })?;

    let mut logger = Logger::try_with_str(options.level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(&options.log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format);
    if let Some(echo) = options.echo_to_stderr {
        logger = logger
            .duplicate_to_stderr(echo.duplicate())
            .format_for_stderr(flexi_logger::default_format);
    }
    let handle = logger
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=logging_start module=logging status=ok version={} os={} arch={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        options.level,
        options.log_dir.display()
    );

    Ok(ActiveLogger {
        options: options.clone(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            sanitize_message(&payload, PANIC_PAYLOAD_LIMIT)
        );
        previous(panic_info);
    }));
}

/// Flattens `value` onto one line, keeping at most `limit` characters.
pub(crate) fn sanitize_message(value: &str, limit: usize) -> String {
    let mut flattened: String = value
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(limit)
        .collect();
    if value.chars().count() > limit {
        flattened.push_str("...");
    }
    flattened
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, init_logging_with, logging_status, sanitize_message, LogLevel,
        LoggingError, LoggingOptions,
    };
    use std::path::Path;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(LogLevel::parse(" INFO ").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::parse("warning").unwrap(), LogLevel::Warn);
        assert!(matches!(
            LogLevel::parse("verbose"),
            Err(LoggingError::InvalidLevel(level)) if level == "verbose"
        ));
    }

    #[test]
    fn relative_directories_are_rejected() {
        let err = init_logging(LogLevel::Info, Path::new("logs")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDirectory(_)), "{err}");
    }

    #[test]
    fn sanitized_messages_are_single_line_and_bounded() {
        assert_eq!(sanitize_message("a\nb\rc", 10), "a b c");
        assert_eq!(sanitize_message("abcdef", 3), "abc...");
    }

    #[test]
    fn second_init_must_match_the_first() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        init_logging(LogLevel::Info, log_dir.path()).unwrap();
        init_logging(LogLevel::Info, log_dir.path()).unwrap();

        let err = init_logging(LogLevel::Debug, log_dir.path()).unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyActive { .. }), "{err}");
        assert!(init_logging(LogLevel::Info, other_dir.path()).is_err());
        assert!(init_logging_with(
            &LoggingOptions::new(LogLevel::Info, log_dir.path()).echo(LogLevel::Warn)
        )
        .is_err());

        let status = logging_status().unwrap();
        assert_eq!(status.level, LogLevel::Info);
        assert_eq!(status.log_dir, log_dir.path());
    }
}
