//! The termination handler.
//!
//! Two entry points feed one pipeline: `handle_exception` for raised values
//! and `handle_shutdown` for process end. Each condition is classified,
//! delivered to the mediator at most once, and falls back to the default
//! diagnostic when delivery is impossible or fails.

use crate::classifier::{FaultClassifier, LastErrorClassifier};
use crate::diagnostic;
use crate::fault::{Raised, TerminationCondition};
use crate::mediator::{topics, Event, Mediator};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result of a single notify attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// A listener raised `PurposefulHalt`.
    Halted,
    /// A listener raised something else.
    Failed(Raised),
}

/// Terminal state of one handled condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    FallbackEmitted,
    Suppressed,
    /// Normal shutdown with nobody listening; nothing was attempted.
    Unobserved,
}

#[derive(Debug, Default)]
struct HandlerState {
    /// Set once the shutdown topic has been dealt with, either by the
    /// shutdown entry point or by a fatal error routed through the
    /// exception entry point.
    shutdown_handled: bool,
}

pub struct Termination {
    mediator: Option<Arc<dyn Mediator>>,
    debug: bool,
    classifier: Box<dyn FaultClassifier>,
    output: Mutex<Box<dyn Write + Send>>,
    state: Mutex<HandlerState>,
}

impl Termination {
    /// Handler notifying `mediator`, writing fallbacks to stderr.
    pub fn new(mediator: Option<Arc<dyn Mediator>>, debug: bool) -> Self {
        Self {
            mediator,
            debug,
            classifier: Box::new(LastErrorClassifier::default()),
            output: Mutex::new(Box::new(std::io::stderr())),
            state: Mutex::new(HandlerState::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: impl FaultClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Redirect fallback diagnostics.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Mutex::new(Box::new(output));
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn mediator(&self) -> Option<&Arc<dyn Mediator>> {
        self.mediator.as_ref()
    }

    /// Exception entry point.
    pub fn handle_exception(&self, raised: Raised) -> Outcome {
        let condition = TerminationCondition::of(&raised);
        if condition == TerminationCondition::PurposefulHalt {
            tracing::debug!("purposeful halt, nothing to report");
            return Outcome::Suppressed;
        }
        let fatal = condition.is_fatal();
        if fatal {
            self.state().shutdown_handled = true;
        }

        let Some(mediator) = self.listening(topics::EXCEPTION) else {
            tracing::debug!(fatal, "no exception listeners, using default diagnostic");
            self.emit_fallback(&raised);
            return Outcome::FallbackEmitted;
        };

        let event = Event::Exception {
            fault: &raised,
            fatal,
        };
        match deliver(mediator, topics::EXCEPTION, &event) {
            Delivery::Delivered => {}
            Delivery::Halted => return Outcome::Suppressed,
            Delivery::Failed(secondary) => {
                tracing::warn!(%secondary, original = %raised, "exception listener failed");
                self.emit_fallback(&raised);
                return Outcome::FallbackEmitted;
            }
        }

        // A fatal error never reaches the normal shutdown path, so shutdown
        // listeners are notified here.
        if !fatal || !mediator.has_listeners_for(topics::SHUTDOWN) {
            return Outcome::Delivered;
        }
        match deliver(mediator, topics::SHUTDOWN, &Event::Shutdown) {
            Delivery::Delivered => Outcome::Delivered,
            Delivery::Halted => Outcome::Suppressed,
            Delivery::Failed(secondary) => {
                tracing::warn!(
                    %secondary,
                    original = %raised,
                    "shutdown listener failed after fatal error"
                );
                self.emit_fallback(&raised);
                Outcome::FallbackEmitted
            }
        }
    }

    /// Shutdown entry point. Runs at most once; later calls are no-ops.
    pub fn handle_shutdown(&self) -> Outcome {
        if std::mem::replace(&mut self.state().shutdown_handled, true) {
            tracing::debug!("shutdown already handled");
            return Outcome::Unobserved;
        }

        let condition = TerminationCondition::at_shutdown(self.classifier.last_fatal_error());
        if let TerminationCondition::FatalRuntimeError(fatal) = condition {
            tracing::debug!(message = fatal.message(), "fatal error detected at shutdown");
            return self.handle_exception(Raised::Fatal(fatal));
        }

        let Some(mediator) = self.listening(topics::SHUTDOWN) else {
            return Outcome::Unobserved;
        };
        match deliver(mediator, topics::SHUTDOWN, &Event::Shutdown) {
            Delivery::Delivered => {
                tracing::info!("shutdown listeners notified");
                Outcome::Delivered
            }
            Delivery::Halted => Outcome::Suppressed,
            Delivery::Failed(raised) => {
                tracing::warn!(%raised, "shutdown listener failed");
                self.emit_fallback(&raised);
                Outcome::FallbackEmitted
            }
        }
    }

    fn listening(&self, topic: &str) -> Option<&dyn Mediator> {
        let mediator = self.mediator.as_deref()?;
        mediator.has_listeners_for(topic).then_some(mediator)
    }

    fn emit_fallback(&self, raised: &Raised) {
        let Some(text) = diagnostic::format(raised, self.debug) else {
            return;
        };
        let mut out = self.output.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write fallback diagnostic");
        }
    }

    fn state(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Notify `topic` once, turning raised values and listener panics into a
/// `Delivery`.
pub fn deliver(mediator: &dyn Mediator, topic: &str, event: &Event<'_>) -> Delivery {
    tracing::debug!(topic, "notifying listeners");
    match panic::catch_unwind(AssertUnwindSafe(|| mediator.notify(topic, event))) {
        Ok(Ok(())) => Delivery::Delivered,
        Ok(Err(Raised::Halt)) => Delivery::Halted,
        Ok(Err(raised)) => Delivery::Failed(raised),
        Err(payload) => match Raised::from_panic_payload(payload.as_ref()) {
            Raised::Halt => Delivery::Halted,
            raised => Delivery::Failed(raised),
        },
    }
}
