//! Mock Event Sink Implementation
//!
//! Stores emitted events in memory for test assertions.
//! Thread-safe via `Arc<Mutex<>>`; waiters are woken through `Notify`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::{AuthEvent, AuthEventSink, EmitError};

/// Mock sink that records events for test assertions.
#[derive(Debug, Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<AuthEvent>>>,
    notify: Arc<Notify>,
}

impl MockEventSink {
    /// Create a new mock sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return all recorded events.
    pub fn recorded_events(&self) -> Vec<AuthEvent> {
        self.events
            .lock()
            .expect("events lock poisoned — prior test panicked")
            .clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.events
            .lock()
            .expect("events lock poisoned — prior test panicked")
            .len()
    }

    /// Clear all recorded events.
    pub fn reset(&self) {
        self.events
            .lock()
            .expect("events lock poisoned — prior test panicked")
            .clear();
    }

    /// Wait until at least `count` events are recorded, or `timeout`
    /// elapses. Returns whatever has been recorded at that point.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<AuthEvent> {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.recorded_events()
    }
}

impl AuthEventSink for MockEventSink {
    fn emit(&self, event: AuthEvent) -> Result<(), EmitError> {
        tracing::debug!(event = event.name(), "Mock sink: recording event");
        self.events
            .lock()
            .map_err(|_| EmitError::Closed)?
            .push(event);
        self.notify.notify_waiters();
        Ok(())
    }
}
