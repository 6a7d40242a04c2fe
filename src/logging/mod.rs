//! Identity logger plumbing
//!
//! The client application reports through a [`LoggerCallback`] filtered by a
//! minimum [`LogLevel`]. The default callback forwards to `tracing` under the
//! `identity` target.

mod history;

pub use history::{LogEntry, LogHistory};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Tracing target used by the default logger callback.
pub const IDENTITY_TARGET: &str = "identity";

/// Identity platform log levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Verbose,
    Trace,
}

impl LogLevel {
    /// Whether a message at `self` passes a `minimum` level filter.
    pub fn passes(self, minimum: LogLevel) -> bool {
        self <= minimum
    }
}

/// Callback receiving `(level, message, contains_pii)`.
#[derive(Clone)]
pub struct LoggerCallback(Arc<dyn Fn(LogLevel, &str, bool) + Send + Sync>);

impl LoggerCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(LogLevel, &str, bool) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, level: LogLevel, message: &str, contains_pii: bool) {
        (self.0)(level, message, contains_pii)
    }
}

impl fmt::Debug for LoggerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggerCallback(..)")
    }
}

/// Two callbacks are equal only when they are the same closure.
impl PartialEq for LoggerCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Logger settings of the `system` configuration group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerOptions {
    #[serde(skip)]
    pub logger_callback: Option<LoggerCallback>,
    pub log_level: LogLevel,
    #[serde(default)]
    pub pii_logging_enabled: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            logger_callback: None,
            log_level: LogLevel::Error,
            pii_logging_enabled: false,
        }
    }
}

impl LoggerOptions {
    /// Deliver a message if it passes the level and PII filters.
    pub fn log(&self, level: LogLevel, message: &str, contains_pii: bool) {
        if !level.passes(self.log_level) || (contains_pii && !self.pii_logging_enabled) {
            return;
        }
        if let Some(cb) = &self.logger_callback {
            cb.call(level, message, contains_pii);
        }
    }
}

/// Build the callback used when the host does not supply one.
///
/// PII messages are always dropped. Everything else reaches `tracing` only
/// when `enabled` is set.
pub fn default_logger_callback(enabled: bool) -> LoggerCallback {
    LoggerCallback::new(move |level, message, contains_pii| {
        if contains_pii || !enabled {
            return;
        }
        match level {
            LogLevel::Error => tracing::error!(target: IDENTITY_TARGET, "{}", message),
            LogLevel::Warning => tracing::warn!(target: IDENTITY_TARGET, "{}", message),
            LogLevel::Info => tracing::info!(target: IDENTITY_TARGET, "{}", message),
            LogLevel::Verbose => tracing::debug!(target: IDENTITY_TARGET, "{}", message),
            LogLevel::Trace => tracing::trace!(target: IDENTITY_TARGET, "{}", message),
        }
    })
}
