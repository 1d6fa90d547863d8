//! # terminus
//!
//! Turns the ways a process can end (a panic unwinding out of the program
//! body, a fatal signal, a panic in an `abort` build, or plain shutdown) into
//! one notification delivered to a pluggable [`Mediator`]. When nobody is
//! listening, or a listener itself fails, a default diagnostic is written
//! instead so a fault is never lost. A [`PurposefulHalt`] stops everything
//! quietly.
//!
//! ```text
//!  panic ──► Registration::run ──► handle_exception ──┐
//!                                                     ├──► Mediator::notify
//!  exit  ──► handle_shutdown ──► FaultClassifier ─────┘        │ fails / absent
//!                                                              ▼
//!                                                   diagnostic::format ──► stderr
//! ```

pub mod classifier;
pub mod config;
pub mod diagnostic;
pub mod error_log;
pub mod fault;
pub mod mediator;
pub mod registration;
pub mod signals;
pub mod termination;

#[cfg(test)]
mod test_support;

pub use classifier::{FaultClassifier, LastErrorClassifier};
pub use config::{load_config, TerminusConfig};
pub use error_log::{ErrorLevel, ErrorLog, ErrorRecord};
pub use fault::{
    Exception, FatalRuntimeError, Location, PurposefulHalt, Raised, TerminationCondition,
};
pub use mediator::{topics, Dispatcher, Event, Mediator};
pub use registration::{halt, Completion, Registration};
pub use signals::{SignalError, SignalWatch};
pub use termination::{Delivery, Outcome, Termination};

use std::sync::Arc;

/// A registered handler plus the signal handlers feeding its classifier.
///
/// Run the body through `registration` before restoring `signals`, so signals
/// arriving while shutdown listeners run are still caught. Field order keeps
/// the same sequence when the whole value is dropped.
pub struct Installed {
    pub registration: Registration,
    pub signals: SignalWatch,
}

/// Startup wiring: build the handler from `config`, install signal handlers
/// and register the panic hook.
pub fn install(
    config: &TerminusConfig,
    mediator: Option<Arc<dyn Mediator>>,
) -> Result<Installed, SignalError> {
    let watched = signals::parse_signals(&config.signals.watch)?;
    let signals = SignalWatch::install(&watched)?;

    let classifier = LastErrorClassifier::new(config.classifier.fatal_levels.clone());
    let registration = Termination::new(mediator, config.debug)
        .with_classifier(classifier)
        .register();
    tracing::info!(
        debug = config.debug,
        signals = ?config.signals.watch,
        "termination handler installed"
    );

    Ok(Installed {
        registration,
        signals,
    })
}
