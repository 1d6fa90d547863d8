use crate::error_log::{ErrorLevel, ErrorLog, ErrorRecord};
use crate::fault::FatalRuntimeError;
use crate::signals;
use nix::sys::signal::Signal;

/// Decides whether the process is ending because of a fatal low-level error.
pub trait FaultClassifier: Send + Sync {
    /// The fatal error ending the process, if any. Side-effect free.
    fn last_fatal_error(&self) -> Option<FatalRuntimeError>;
}

/// Classifier backed by the pending fatal signal and the process error log.
pub struct LastErrorClassifier {
    log: &'static ErrorLog,
    signal_source: Option<fn() -> Option<Signal>>,
    fatal_levels: Vec<ErrorLevel>,
}

impl LastErrorClassifier {
    /// Read the global error log and the installed signal handlers.
    pub fn new(fatal_levels: Vec<ErrorLevel>) -> Self {
        Self {
            log: ErrorLog::global(),
            signal_source: Some(signals::pending),
            fatal_levels,
        }
    }

    pub fn with_log(mut self, log: &'static ErrorLog) -> Self {
        self.log = log;
        self
    }

    /// Replace where pending signals are read from; `None` ignores signals.
    pub fn with_signal_source(mut self, source: Option<fn() -> Option<Signal>>) -> Self {
        self.signal_source = source;
        self
    }

    fn is_fatal(&self, level: ErrorLevel) -> bool {
        self.fatal_levels.contains(&level)
    }
}

/// `Fatal Error: <message> in <file> on line <line>`.
impl From<&ErrorRecord> for FatalRuntimeError {
    fn from(record: &ErrorRecord) -> Self {
        let message = match &record.location {
            Some(loc) => format!(
                "Fatal Error: {} in {} on line {}",
                record.message, loc.file, loc.line
            ),
            None => format!("Fatal Error: {}", record.message),
        };
        FatalRuntimeError::new(message, record.location.clone())
    }
}

impl Default for LastErrorClassifier {
    fn default() -> Self {
        Self::new(ErrorLevel::DEFAULT_FATAL.to_vec())
    }
}

impl FaultClassifier for LastErrorClassifier {
    fn last_fatal_error(&self) -> Option<FatalRuntimeError> {
        if let Some(sig) = self.signal_source.and_then(|source| source()) {
            let record = ErrorRecord::new(
                signals::level_for(sig),
                format!("terminated by {sig}"),
                None,
            );
            if self.is_fatal(record.level) {
                return Some(FatalRuntimeError::from(&record));
            }
        }

        let record = self.log.last()?;
        if self.is_fatal(record.level) {
            Some(FatalRuntimeError::from(&record))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Location;

    fn leaked_log() -> &'static ErrorLog {
        Box::leak(Box::new(ErrorLog::new()))
    }

    fn classifier(log: &'static ErrorLog) -> LastErrorClassifier {
        LastErrorClassifier::default()
            .with_log(log)
            .with_signal_source(None)
    }

    #[test]
    fn test_no_record_is_not_fatal() {
        assert!(classifier(leaked_log()).last_fatal_error().is_none());
    }

    #[test]
    fn test_fatal_record_builds_message_with_location() {
        let log = leaked_log();
        log.record(ErrorRecord::new(
            ErrorLevel::Error,
            "The black knight always triumphs!",
            Some(Location::new("/path/to/file.rs", 42)),
        ));
        let fatal = classifier(log).last_fatal_error().unwrap();
        assert_eq!(
            fatal.message(),
            "Fatal Error: The black knight always triumphs! in /path/to/file.rs on line 42"
        );
        assert_eq!(fatal.location(), Some(&Location::new("/path/to/file.rs", 42)));
    }

    #[test]
    fn test_warning_is_not_fatal() {
        let log = leaked_log();
        log.record(ErrorRecord::new(ErrorLevel::Warning, "careful", None));
        assert!(classifier(log).last_fatal_error().is_none());
    }

    #[test]
    fn test_fatal_levels_are_configurable() {
        let log = leaked_log();
        log.record(ErrorRecord::new(ErrorLevel::Warning, "promoted", None));
        let c = LastErrorClassifier::new(vec![ErrorLevel::Warning])
            .with_log(log)
            .with_signal_source(None);
        assert_eq!(c.last_fatal_error().unwrap().message(), "Fatal Error: promoted");
    }

    #[test]
    fn test_pending_signal_is_fatal() {
        let c = classifier(leaked_log()).with_signal_source(Some(|| Some(Signal::SIGTERM)));
        assert_eq!(
            c.last_fatal_error().unwrap().message(),
            "Fatal Error: terminated by SIGTERM"
        );
    }

    #[test]
    fn test_resource_limit_signal_respects_fatal_levels() {
        let c = LastErrorClassifier::new(vec![ErrorLevel::Signal])
            .with_log(leaked_log())
            .with_signal_source(Some(|| Some(Signal::SIGXCPU)));
        assert!(c.last_fatal_error().is_none());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let log = leaked_log();
        log.record(ErrorRecord::new(ErrorLevel::Error, "once", None));
        let c = classifier(log);
        assert_eq!(c.last_fatal_error(), c.last_fatal_error());
    }
}
