//! Cross-context event transport
//!
//! Events leave the emitting context as JSON frames, the same bytes a
//! message port between processes would carry. The listening side decodes
//! each frame back into an `AuthEvent`.

use tokio::sync::mpsc;

use crate::{AuthEvent, AuthEventSink, EmitError};

/// Emitting half: serializes events and pushes them onto the channel.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<String>,
}

/// Receiving half, living in the subscriber's context.
#[derive(Debug)]
pub struct EventListener {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelEmitter {
    /// Create a connected emitter and listener.
    pub fn pair() -> (ChannelEmitter, EventListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelEmitter { tx }, EventListener { rx })
    }
}

impl AuthEventSink for ChannelEmitter {
    fn emit(&self, event: AuthEvent) -> Result<(), EmitError> {
        let frame = serde_json::to_string(&event)?;
        tracing::debug!(event = event.name(), bytes = frame.len(), "Emitting auth event");
        self.tx.send(frame).map_err(|_| EmitError::Closed)
    }
}

impl EventListener {
    /// Wait for the next event. `None` once every emitter is gone.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        while let Some(frame) = self.rx.recv().await {
            match serde_json::from_str(&frame) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable auth event frame");
                }
            }
        }
        None
    }

    /// Take an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<AuthEvent> {
        while let Ok(frame) = self.rx.try_recv() {
            if let Ok(event) = serde_json::from_str(&frame) {
                return Some(event);
            }
        }
        None
    }
}
