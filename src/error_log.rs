//! Process error log: the most recent low-level error record.
//!
//! The panic hook writes here for panics it cannot route through the
//! exception entry point, and application code may record its own errors.
//! The classifier reads the last record at shutdown.

use crate::fault::Location;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Severity of a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorLevel {
    /// Unrecoverable runtime error, e.g. a panic under `panic = "abort"`.
    Error,
    /// Terminated by a signal.
    Signal,
    /// Terminated for exceeding a resource limit (CPU time, file size).
    ResourceLimit,
    Warning,
    Notice,
    Deprecated,
}

impl ErrorLevel {
    /// Levels treated as process-ending when no configuration says otherwise.
    pub const DEFAULT_FATAL: [ErrorLevel; 3] =
        [ErrorLevel::Error, ErrorLevel::Signal, ErrorLevel::ResourceLimit];
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorLevel::Error => "error",
            ErrorLevel::Signal => "signal",
            ErrorLevel::ResourceLimit => "resource-limit",
            ErrorLevel::Warning => "warning",
            ErrorLevel::Notice => "notice",
            ErrorLevel::Deprecated => "deprecated",
        };
        f.write_str(s)
    }
}

/// A single low-level error record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub level: ErrorLevel,
    pub message: String,
    pub location: Option<Location>,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(level: ErrorLevel, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            level,
            message: message.into(),
            location,
            recorded_at: Utc::now(),
        }
    }
}

/// Holds the most recent error record.
#[derive(Debug, Default)]
pub struct ErrorLog {
    last: Mutex<Option<ErrorRecord>>,
}

static GLOBAL: OnceLock<ErrorLog> = OnceLock::new();

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide log written by the panic hook.
    pub fn global() -> &'static ErrorLog {
        GLOBAL.get_or_init(ErrorLog::new)
    }

    /// Replace the last record.
    pub fn record(&self, record: ErrorRecord) {
        tracing::debug!(
            level = %record.level,
            message = %record.message,
            recorded_at = %record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            "error recorded"
        );
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(record);
    }

    pub fn last(&self) -> Option<ErrorRecord> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
