use crate::fault::Raised;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Topic names the termination handler notifies.
pub mod topics {
    pub const EXCEPTION: &str = "exception";
    pub const SHUTDOWN: &str = "shutdown";
}

/// Payload handed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// An uncaught fault. `fatal` is true when the fault is a fatal
    /// low-level error rather than an ordinary panic.
    Exception { fault: &'a Raised, fatal: bool },
    Shutdown,
}

/// Event dispatch collaborator.
///
/// `notify` runs every listener for `topic` synchronously, in registration
/// order, and propagates the first value a listener raises.
pub trait Mediator: Send + Sync {
    fn notify(&self, topic: &str, event: &Event<'_>) -> Result<(), Raised>;

    fn has_listeners_for(&self, topic: &str) -> bool;
}

pub type Listener = Arc<dyn Fn(&Event<'_>) -> Result<(), Raised> + Send + Sync>;

/// Minimal mediator: listeners keyed by topic, kept in push order.
///
/// `notify` runs a snapshot of the queue taken before the first listener is
/// called, so listeners may push or clear; the change applies from the next
/// `notify`.
#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener to `topic`'s queue. Returns the new queue length.
    pub fn push<F>(&self, topic: &str, listener: F) -> usize
    where
        F: Fn(&Event<'_>) -> Result<(), Raised> + Send + Sync + 'static,
    {
        let mut map = self
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let queue = map.entry(topic.to_string()).or_default();
        queue.push(Arc::new(listener));
        queue.len()
    }

    pub fn count(&self, topic: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Remove every listener for `topic`.
    pub fn clear(&self, topic: &str) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(topic);
    }
}

impl Mediator for Dispatcher {
    fn notify(&self, topic: &str, event: &Event<'_>) -> Result<(), Raised> {
        let queue: Vec<Listener> = match self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
        {
            Some(queue) => queue.clone(),
            None => return Ok(()),
        };
        for (index, listener) in queue.iter().enumerate() {
            if let Err(raised) = listener(event) {
                tracing::debug!(topic, index, %raised, "listener raised, stopping queue");
                return Err(raised);
            }
        }
        Ok(())
    }

    fn has_listeners_for(&self, topic: &str) -> bool {
        self.count(topic) > 0
    }
}
