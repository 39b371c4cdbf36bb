//! Process-wide log setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the application, either directly or through [`init_logging`].

use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use crate::error::{NnError, Result};

/// Log verbosity on the classic 0..=5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    None,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_verbosity(level: i32) -> Option<Self> {
        match level {
            0 => Some(LogLevel::None),
            1 => Some(LogLevel::Fatal),
            2 => Some(LogLevel::Error),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Info),
            5 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// `tracing` has no fatal level; fatal and error both map to ERROR.
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::None => LevelFilter::OFF,
            LogLevel::Fatal | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::None => "none",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Install a stderr subscriber at `level`. Fails if a global subscriber is
/// already set.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level.filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| NnError::Logging(e.to_string()))
}
