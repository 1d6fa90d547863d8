//! Values that travel through the termination pipeline.
//!
//! A `Raised` value is anything that can end up at the exception entry point:
//! a panic that unwound out of the program body, a value returned as an error
//! by a listener, the purposeful halt marker, or the internal fatal-error
//! marker produced by the classifier.

use std::any::Any;
use std::fmt;

/// Source position of a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl From<&std::panic::Location<'_>> for Location {
    fn from(loc: &std::panic::Location<'_>) -> Self {
        Self::new(loc.file(), loc.line())
    }
}

/// Marker meaning "stop now, this is not a fault".
///
/// Listeners raise it after they have produced their own response and want
/// the process to end without fault reporting. Application code raises it
/// with [`crate::halt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurposefulHalt;

/// A fatal low-level error shuttled through the exception pipeline.
///
/// Only the crate constructs these (from the classifier), so a listener that
/// sees one knows the process was ended by the runtime rather than by an
/// ordinary panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalRuntimeError {
    message: String,
    location: Option<Location>,
}

impl FatalRuntimeError {
    pub(crate) fn new(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }
}

/// A generic uncaught fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// Category label, e.g. `Panic`.
    pub kind: String,
    pub message: String,
    pub location: Option<Location>,
    /// Rendered backtrace, when one was captured.
    pub trace: Option<String>,
}

impl Exception {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            location: None,
            trace: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// Anything that can be raised into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raised {
    Halt,
    Fatal(FatalRuntimeError),
    Exception(Exception),
}

impl Raised {
    /// Convert a panic payload into a raised value.
    ///
    /// `PurposefulHalt`, `FatalRuntimeError` and `Raised` payloads keep their
    /// meaning; string payloads become a `Panic` exception. Location and
    /// trace are attached by the caller, which saw the panic hook.
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        if payload.is::<PurposefulHalt>() {
            return Raised::Halt;
        }
        if let Some(raised) = payload.downcast_ref::<Raised>() {
            return raised.clone();
        }
        if let Some(fatal) = payload.downcast_ref::<FatalRuntimeError>() {
            return Raised::Fatal(fatal.clone());
        }
        Raised::Exception(Exception::new("Panic", panic_message(payload)))
    }
}

impl From<PurposefulHalt> for Raised {
    fn from(_: PurposefulHalt) -> Self {
        Raised::Halt
    }
}

impl From<Exception> for Raised {
    fn from(e: Exception) -> Self {
        Raised::Exception(e)
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Raised::Halt => write!(f, "purposeful halt"),
            Raised::Fatal(e) => write!(f, "fatal runtime error: {}", e.message),
            Raised::Exception(e) => write!(f, "{}: {}", e.kind, e.message),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// The condition a single termination event is classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCondition {
    NormalShutdown,
    FatalRuntimeError(FatalRuntimeError),
    UncaughtException(Exception),
    PurposefulHalt,
}

impl TerminationCondition {
    /// Classify a value that reached the exception entry point.
    pub fn of(raised: &Raised) -> Self {
        match raised {
            Raised::Halt => TerminationCondition::PurposefulHalt,
            Raised::Fatal(e) => TerminationCondition::FatalRuntimeError(e.clone()),
            Raised::Exception(e) => TerminationCondition::UncaughtException(e.clone()),
        }
    }

    /// Classify process end from what the fault classifier found.
    pub fn at_shutdown(fatal: Option<FatalRuntimeError>) -> Self {
        fatal.map_or(
            TerminationCondition::NormalShutdown,
            TerminationCondition::FatalRuntimeError,
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TerminationCondition::FatalRuntimeError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_payload_becomes_halt() {
        let payload: Box<dyn Any + Send> = Box::new(PurposefulHalt);
        assert_eq!(Raised::from_panic_payload(payload.as_ref()), Raised::Halt);
    }

    #[test]
    fn test_str_payload_becomes_panic_exception() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        match Raised::from_panic_payload(payload.as_ref()) {
            Raised::Exception(e) => {
                assert_eq!(e.kind, "Panic");
                assert_eq!(e.message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_string_payload_keeps_message() {
        let payload: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        let raised = Raised::from_panic_payload(payload.as_ref());
        assert_eq!(raised.to_string(), "Panic: code 7");
    }

    #[test]
    fn test_raised_payload_passes_through() {
        let original = Raised::Exception(Exception::new("Listener", "bad"));
        let payload: Box<dyn Any + Send> = Box::new(original.clone());
        assert_eq!(Raised::from_panic_payload(payload.as_ref()), original);
    }

    #[test]
    fn test_opaque_payload_has_placeholder_message() {
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn test_condition_classification() {
        let fatal = FatalRuntimeError::new("oops", Some(Location::new("a.ext", 42)));
        assert!(TerminationCondition::of(&Raised::Fatal(fatal)).is_fatal());
        assert_eq!(
            TerminationCondition::of(&Raised::Halt),
            TerminationCondition::PurposefulHalt
        );
        assert!(!TerminationCondition::of(&Exception::new("Panic", "x").into()).is_fatal());
    }

    #[test]
    fn test_shutdown_condition() {
        assert_eq!(
            TerminationCondition::at_shutdown(None),
            TerminationCondition::NormalShutdown
        );
        let fatal = FatalRuntimeError::new("terminated by SIGTERM", None);
        let condition = TerminationCondition::at_shutdown(Some(fatal.clone()));
        assert!(condition.is_fatal());
        assert_eq!(condition, TerminationCondition::FatalRuntimeError(fatal));
    }
}
