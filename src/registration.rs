//! Process-wide installation of the termination handler.
//!
//! `Termination::register` installs a panic hook and returns the owning
//! `Registration` handle. The startup code keeps the handle until the program
//! body runs through `Registration::run`, which consumes it.

use crate::error_log::{ErrorLevel, ErrorLog, ErrorRecord};
use crate::fault::{panic_message, FatalRuntimeError, Location, PurposefulHalt, Raised};
use crate::termination::{Outcome, Termination};
use std::any::Any;
use std::backtrace::Backtrace;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};

/// Hook state of the registration whose panic hook is currently installed.
static ACTIVE: Mutex<Option<Weak<HookState>>> = Mutex::new(None);

/// How the guarded program body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Returned(T),
    /// Stopped by a purposeful halt, from the body or from a listener.
    Halted,
    Faulted,
}

/// Details the panic hook saw, used to enrich the unwound payload.
#[derive(Debug, Clone)]
struct PanicCapture {
    halt: bool,
    message: String,
    location: Option<Location>,
    trace: Option<String>,
}

struct HookState {
    owner: ThreadId,
    debug: bool,
    capture: Mutex<Option<PanicCapture>>,
}

impl HookState {
    fn on_panic(
        &self,
        handler: &Termination,
        payload: &(dyn Any + Send),
        location: Option<Location>,
    ) {
        let current = thread::current();
        if current.id() != self.owner {
            let thread = current.name().unwrap_or("<unnamed>").to_string();
            let message = panic_message(payload);
            tracing::error!(
                %thread,
                reason = %message,
                location = ?location,
                "panic on background thread"
            );
            ErrorLog::global().record(ErrorRecord::new(
                ErrorLevel::Warning,
                format!("thread '{thread}' panicked: {message}"),
                location,
            ));
            return;
        }

        let halt = payload.is::<PurposefulHalt>();
        if cfg!(panic = "abort") {
            // Unwinding will never reach `run`; finish the pipeline here.
            if !halt {
                ErrorLog::global().record(ErrorRecord::new(
                    ErrorLevel::Error,
                    panic_message(payload),
                    location,
                ));
            }
            handler.handle_shutdown();
            return;
        }

        let trace = (self.debug && !halt).then(|| Backtrace::force_capture().to_string());
        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = Some(PanicCapture {
            halt,
            message: panic_message(payload),
            location,
            trace,
        });
    }

    fn take_capture(&self) -> Option<PanicCapture> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Owned handle for the installed handler.
///
/// Dropping it runs the shutdown entry point (if it has not run yet) and
/// restores the default panic hook, unless a newer registration has replaced
/// it since. A panic unwinding past a live handle is reported as a fatal
/// error; listeners must not panic on that path, as a second panic during
/// unwinding aborts the process.
pub struct Registration {
    handler: Arc<Termination>,
    hook: Arc<HookState>,
}

impl Termination {
    /// Install this handler as the process panic hook.
    ///
    /// Registering again replaces the previous hook; hooks are not chained.
    pub fn register(self) -> Registration {
        let handler = Arc::new(self);
        let hook = Arc::new(HookState {
            owner: thread::current().id(),
            debug: handler.debug(),
            capture: Mutex::new(None),
        });

        let hook_state = Arc::clone(&hook);
        let hook_handler = Arc::clone(&handler);
        panic::set_hook(Box::new(move |info| {
            let location = info.location().map(Location::from);
            hook_state.on_panic(&hook_handler, info.payload(), location);
        }));
        *active_slot() = Some(Arc::downgrade(&hook));
        tracing::debug!(debug = handler.debug(), "termination handler registered");

        Registration { handler, hook }
    }
}

impl Registration {
    /// Run the program body, routing an escaping panic to the exception
    /// entry point, then run the shutdown entry point and release the hook.
    pub fn run<F, T>(self, body: F) -> Completion<T>
    where
        F: FnOnce() -> T,
    {
        let completion = match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => Completion::Returned(value),
            Err(payload) => {
                let raised = self.raised_from(payload.as_ref());
                match self.handler.handle_exception(raised) {
                    Outcome::Suppressed => Completion::Halted,
                    _ => Completion::Faulted,
                }
            }
        };
        self.handler.handle_shutdown();
        completion
    }

    /// Run the shutdown entry point and exit the process with `code`.
    pub fn exit(self, code: i32) -> ! {
        drop(self);
        std::process::exit(code)
    }

    pub fn handler(&self) -> &Termination {
        &self.handler
    }

    fn raised_from(&self, payload: &(dyn Any + Send)) -> Raised {
        let raised = Raised::from_panic_payload(payload);
        let Some(capture) = self.hook.take_capture() else {
            return raised;
        };
        match raised {
            Raised::Exception(mut e) => {
                if e.location.is_none() {
                    e.location = capture.location;
                }
                if e.trace.is_none() {
                    e.trace = capture.trace;
                }
                Raised::Exception(e)
            }
            other => other,
        }
    }

    /// A panic escaped outside `run` and bypassed the exception entry point.
    fn report_escaped(&self, capture: PanicCapture) {
        tracing::error!(
            reason = %capture.message,
            location = ?capture.location,
            "panic escaped the guarded program body"
        );
        let record = ErrorRecord::new(ErrorLevel::Error, capture.message, capture.location);
        self.handler
            .handle_exception(Raised::Fatal(FatalRuntimeError::from(&record)));
    }
}

impl Deref for Registration {
    type Target = Termination;

    fn deref(&self) -> &Termination {
        &self.handler
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let panicking = thread::panicking();
        if panicking {
            if let Some(capture) = self.hook.take_capture().filter(|c| !c.halt) {
                self.report_escaped(capture);
            }
        }
        self.handler.handle_shutdown();

        let mut active = active_slot();
        let current = active
            .as_ref()
            .is_some_and(|hook| std::ptr::eq(hook.as_ptr(), Arc::as_ptr(&self.hook)));
        if current {
            *active = None;
            // The hook cannot be swapped while unwinding; it stays installed.
            if !panicking {
                let _ = panic::take_hook();
            }
        }
    }
}

fn active_slot() -> MutexGuard<'static, Option<Weak<HookState>>> {
    ACTIVE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Stop the program body without reporting a fault.
///
/// Shutdown listeners still run.
pub fn halt() -> ! {
    panic::panic_any(PurposefulHalt)
}
