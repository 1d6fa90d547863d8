//! Default diagnostic text for faults nobody listened to.
//!
//! Pure: the termination handler decides where the text goes.

use crate::fault::{Location, Raised};

/// Render the fallback diagnostic for `raised`.
///
/// Returns `None` when `debug` is off so production builds never leak
/// internals. Otherwise the text starts with
/// `exception '<Kind>' with message '<message>'`, followed by the source
/// location and trace when known.
pub fn format(raised: &Raised, debug: bool) -> Option<String> {
    if !debug {
        return None;
    }

    let (kind, message, location, trace) = match raised {
        Raised::Halt => ("PurposefulHalt", "", None, None),
        Raised::Fatal(e) => ("FatalRuntimeError", e.message(), e.location(), None),
        Raised::Exception(e) => (
            e.kind.as_str(),
            e.message.as_str(),
            e.location.as_ref(),
            e.trace.as_deref(),
        ),
    };

    Some(render(kind, message, location, trace))
}

fn render(kind: &str, message: &str, location: Option<&Location>, trace: Option<&str>) -> String {
    let mut out = format!("exception '{kind}' with message '{message}'");
    if let Some(loc) = location {
        out.push_str(&format!(" in {loc}"));
    }
    if let Some(trace) = trace {
        out.push_str("\nStack trace:\n");
        out.push_str(trace.trim_end());
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{Exception, FatalRuntimeError};

    #[test]
    fn test_no_output_without_debug() {
        let values = [
            Raised::Halt,
            Raised::Exception(Exception::new("Panic", "test")),
            Raised::Fatal(FatalRuntimeError::new("oops", None)),
        ];
        for v in &values {
            assert_eq!(format(v, false), None);
        }
    }

    #[test]
    fn test_exception_prefix() {
        let text = format(&Exception::new("Exception", "test").into(), true).unwrap();
        assert!(text.starts_with("exception 'Exception' with message 'test'"));
    }

    #[test]
    fn test_location_and_trace_included() {
        let e = Exception::new("Panic", "boom")
            .with_location(Location::new("src/main.rs", 10))
            .with_trace("   0: main\n");
        let text = format(&e.into(), true).unwrap();
        assert_eq!(
            text,
            "exception 'Panic' with message 'boom' in src/main.rs:10\nStack trace:\n   0: main\n"
        );
    }

    #[test]
    fn test_fatal_error_label() {
        let fatal = FatalRuntimeError::new("oops", Some(Location::new("a.ext", 42)));
        let text = format(&Raised::Fatal(fatal), true).unwrap();
        assert_eq!(
            text,
            "exception 'FatalRuntimeError' with message 'oops' in a.ext:42\n"
        );
    }

    #[test]
    fn test_deterministic() {
        let v: Raised = Exception::new("Panic", "same")
            .with_trace("   0: frame")
            .into();
        assert_eq!(format(&v, true), format(&v, true));
    }
}
