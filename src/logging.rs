use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogTarget {
    #[default]
    Console,
    File,
    All,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("no log file location available, pass --log-output")]
    NoLogPath,
    #[error("failed to open log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("tenancy-reaper").join("tenancy-reaper.log"))
}

/// Filter used when `RUST_LOG` is not set.
///
/// NOTE: HTTP client internals stay at warn unless debugging.
pub fn filter_directives(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info,reqwest=warn,hyper=warn,hyper_util=warn",
        LogLevel::Warn => "warn",
    }
}

pub fn init(target: LogTarget, level: LogLevel, output: Option<&Path>) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let console = matches!(target, LogTarget::Console | LogTarget::All)
        .then(|| fmt::layer().with_writer(std::io::stderr));

    let file = match target {
        LogTarget::File | LogTarget::All => {
            let path = output
                .map(Path::to_path_buf)
                .or_else(default_log_path)
                .ok_or(LoggingError::NoLogPath)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(open_log(&path)?)))
        }
        LogTarget::Console | LogTarget::None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}

fn open_log(path: &Path) -> Result<std::fs::File, LoggingError> {
    let io_err = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)
}
