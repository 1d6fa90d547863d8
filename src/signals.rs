//! Fatal signal capture.
//!
//! Installs handlers for process-ending signals (SIGTERM, SIGINT, SIGHUP,
//! SIGXCPU, ...). The handler stores the signal number in an atomic and is
//! one-shot: the disposition resets to the default on delivery, so a second
//! signal ends the process even when the program body never polls
//! `pending()`. A body that does poll returns normally, and the shutdown
//! entry point classifies the signal as a fatal low-level error.
use crate::error_log::ErrorLevel;
use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicI32, Ordering};

static PENDING: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_signal(signo: libc::c_int) {
    PENDING.store(signo, Ordering::SeqCst);
}

/// Most recent watched signal received, if any.
pub fn pending() -> Option<Signal> {
    match PENDING.load(Ordering::SeqCst) {
        0 => None,
        n => Signal::try_from(n).ok(),
    }
}

/// Forget any received signal.
pub fn clear_pending() {
    PENDING.store(0, Ordering::SeqCst);
}

/// Error level a terminating signal is recorded as.
pub fn level_for(sig: Signal) -> ErrorLevel {
    match sig {
        Signal::SIGXCPU | Signal::SIGXFSZ => ErrorLevel::ResourceLimit,
        _ => ErrorLevel::Signal,
    }
}

/// Parse signal names such as `SIGTERM`.
pub fn parse_signals(names: &[String]) -> Result<Vec<Signal>, SignalError> {
    names
        .iter()
        .map(|name| {
            name.parse::<Signal>()
                .map_err(|_| SignalError::UnknownSignal { name: name.clone() })
        })
        .collect()
}

/// Errors from signal setup.
#[derive(Debug)]
pub enum SignalError {
    UnknownSignal { name: String },
    Install { signal: Signal, source: nix::Error },
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::UnknownSignal { name } => write!(f, "unknown signal name '{name}'"),
            SignalError::Install { signal, source } => {
                write!(f, "failed to install handler for {signal}: {source}")
            }
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignalError::UnknownSignal { .. } => None,
            SignalError::Install { source, .. } => Some(source),
        }
    }
}

/// Installed signal handlers, with the dispositions they replaced.
pub struct SignalWatch {
    previous: Vec<(Signal, SigAction)>,
}

impl SignalWatch {
    /// Install the recording handler for each signal.
    ///
    /// The first delivery is recorded; the kernel then restores the default
    /// action, so a repeated signal terminates the process.
    pub fn install(signals: &[Signal]) -> Result<SignalWatch, SignalError> {
        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::SA_RESTART | SaFlags::SA_RESETHAND,
            SigSet::empty(),
        );
        let mut watch = SignalWatch {
            previous: Vec::with_capacity(signals.len()),
        };
        for &sig in signals {
            // SAFETY: record_signal only performs an atomic store.
            let old = unsafe { signal::sigaction(sig, &action) }
                .map_err(|source| SignalError::Install { signal: sig, source })?;
            watch.previous.push((sig, old));
        }
        tracing::debug!(signals = ?signals, "signal handlers installed");
        Ok(watch)
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.previous.iter().map(|(sig, _)| *sig).collect()
    }

    /// Reinstall the dispositions that were active before `install`.
    pub fn restore(mut self) {
        self.restore_previous();
    }

    fn restore_previous(&mut self) {
        for (sig, old) in self.previous.drain(..).rev() {
            // SAFETY: reinstating a disposition previously returned by sigaction.
            if let Err(e) = unsafe { signal::sigaction(sig, &old) } {
                tracing::warn!(signal = %sig, error = %e, "failed to restore signal disposition");
            }
        }
    }
}

impl Drop for SignalWatch {
    fn drop(&mut self) {
        self.restore_previous();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_resource_limit_signals() {
        assert_eq!(level_for(Signal::SIGXCPU), ErrorLevel::ResourceLimit);
        assert_eq!(level_for(Signal::SIGXFSZ), ErrorLevel::ResourceLimit);
        assert_eq!(level_for(Signal::SIGTERM), ErrorLevel::Signal);
    }

    #[test]
    fn test_parse_signals() {
        let names = vec!["SIGTERM".to_string(), "SIGHUP".to_string()];
        assert_eq!(
            parse_signals(&names).unwrap(),
            vec![Signal::SIGTERM, Signal::SIGHUP]
        );
    }

    #[test]
    fn test_parse_unknown_signal() {
        let err = parse_signals(&["SIGNOPE".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "unknown signal name 'SIGNOPE'");
    }

    #[test]
    fn test_installed_handler_records_signal_once() {
        clear_pending();
        let watch = SignalWatch::install(&[Signal::SIGUSR2]).unwrap();
        assert_eq!(watch.signals(), vec![Signal::SIGUSR2]);

        signal::raise(Signal::SIGUSR2).unwrap();
        assert_eq!(pending(), Some(Signal::SIGUSR2));

        // One-shot: the delivery put the default disposition back, so a
        // repeated signal would take the default action.
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        let current = unsafe { signal::sigaction(Signal::SIGUSR2, &ignore) }.unwrap();
        assert_eq!(current.handler(), SigHandler::SigDfl);

        watch.restore();
        clear_pending();
        assert_eq!(pending(), None);
    }
}
