//! Helpers shared by the unit tests.

use crate::fault::Raised;
use crate::mediator::{Dispatcher, Event, Mediator};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// In-memory writer whose contents can be read after the handler drops it.
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Dispatcher that also records every `notify` call it receives.
#[derive(Default)]
pub struct CountingMediator {
    pub dispatcher: Dispatcher,
    notified: Mutex<Vec<String>>,
}

impl CountingMediator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }
}

impl Mediator for CountingMediator {
    fn notify(&self, topic: &str, event: &Event<'_>) -> Result<(), Raised> {
        self.notified.lock().unwrap().push(topic.to_string());
        self.dispatcher.notify(topic, event)
    }

    fn has_listeners_for(&self, topic: &str) -> bool {
        self.dispatcher.has_listeners_for(topic)
    }
}
