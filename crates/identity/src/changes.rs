//! Session change stream
//!
//! Every subscriber gets its own unbounded channel. The state current at
//! subscribe time is delivered first, so a new subscriber never has to
//! query the provider separately to learn where things stand.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::ProviderUser;

/// A session transition reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedIn(ProviderUser),
    SignedOut,
}

impl SessionState {
    pub fn from_user(user: Option<ProviderUser>) -> Self {
        match user {
            Some(user) => SessionState::SignedIn(user),
            None => SessionState::SignedOut,
        }
    }

    pub fn user(&self) -> Option<&ProviderUser> {
        match self {
            SessionState::SignedIn(user) => Some(user),
            SessionState::SignedOut => None,
        }
    }

    pub fn into_user(self) -> Option<ProviderUser> {
        match self {
            SessionState::SignedIn(user) => Some(user),
            SessionState::SignedOut => None,
        }
    }
}

/// Receiving half of a session change subscription.
#[derive(Debug)]
pub struct SessionChanges {
    rx: mpsc::UnboundedReceiver<SessionState>,
}

impl SessionChanges {
    /// Wait for the next transition. `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<SessionState> {
        self.rx.recv().await
    }

    /// Take a transition that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<SessionState> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out of session transitions to all live subscribers.
#[derive(Debug, Default)]
pub struct SessionBroadcaster {
    listeners: Mutex<Vec<mpsc::UnboundedSender<SessionState>>>,
}

impl SessionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. `current` is read while the listener list is
    /// locked so a concurrent `publish` cannot slip between the replay and
    /// the registration.
    pub fn subscribe(&self, current: impl FnOnce() -> SessionState) -> SessionChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        // Receiver is alive here, send cannot fail.
        let _ = tx.send(current());
        listeners.push(tx);
        SessionChanges { rx }
    }

    /// Deliver a transition to every subscriber, dropping closed ones.
    pub fn publish(&self, state: SessionState) {
        self.transition(|| Some(state));
    }

    /// Apply a session update and publish its outcome as one step.
    ///
    /// `apply` runs with the listener list locked, so a concurrent
    /// `subscribe` sees either the old state followed by the published
    /// transition, or the new state as its replay and nothing else.
    /// Returning `None` publishes nothing.
    pub fn transition(&self, apply: impl FnOnce() -> Option<SessionState>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = apply() else {
            return;
        };
        listeners.retain(|tx| tx.send(state.clone()).is_ok());
        tracing::debug!(
            signed_in = state.user().is_some(),
            listeners = listeners.len(),
            "Published session change"
        );
    }

    /// Number of subscribers still attached.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }
}
