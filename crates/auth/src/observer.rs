//! Session observer
//!
//! Owns the single subscription to the provider's change stream. Every
//! notification, including the replay delivered on subscribe, becomes one
//! `onAuthStateChanged` event carrying a fully merged snapshot.
//!
//! Notifications are handled concurrently. With `EventOrdering::Unordered`
//! a slow claims lookup for an older notification can emit after a newer
//! one. `EventOrdering::Supersede` stamps each notification with a sequence
//! number and drops emissions that a newer one already overtook. Snapshots
//! pushed by `AuthSession::refresh` draw from the same sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sessionsync_common::EventOrdering;
use sessionsync_events::{AuthEvent, AuthEventSink, EmitError};
use sessionsync_identity::{IdentityProvider, SessionChanges, SessionState};
use tokio::task::JoinHandle;

use crate::claims::ClaimsResolver;
use crate::error::AuthError;
use crate::projector::project_user;

struct Registration {
    dispatch: Arc<Dispatch>,
    listener: JoinHandle<()>,
}

/// Per-registration state shared by the notification handlers.
struct Dispatch {
    resolver: ClaimsResolver,
    sink: Arc<dyn AuthEventSink>,
    ordering: EventOrdering,
    issued: AtomicU64,
    newest_emitted: AtomicU64,
}

impl Dispatch {
    fn next_sequence(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Emit `event` unless a newer sequence already emitted under
    /// `Supersede`. A dropped event is not an error.
    fn deliver(&self, sequence: u64, event: AuthEvent) -> Result<(), EmitError> {
        if self.ordering == EventOrdering::Supersede {
            let newest = self.newest_emitted.fetch_max(sequence, Ordering::SeqCst);
            if newest > sequence {
                tracing::debug!(sequence, newest, "Dropping superseded session snapshot");
                return Ok(());
            }
        }

        tracing::debug!(sequence, uid = ?event.user().map(|u| &u.uid), "Emitting session snapshot");
        self.sink.emit(event)
    }

    async fn handle(&self, sequence: u64, state: SessionState) {
        let user = project_user(state.user());

        let snapshot = match user {
            None => None,
            Some(user) => match self.resolver.get_claims(false).await {
                Ok(claims) => Some(user.with_claims(claims)),
                Err(e) => {
                    // No caller to report to; emit without claims rather
                    // than lose the transition.
                    tracing::warn!(uid = %user.uid, error = %e, "Claims unavailable, emitting without claims");
                    Some(user.with_claims(None))
                }
            },
        };

        if let Err(e) = self.deliver(sequence, AuthEvent::AuthStateChanged(snapshot)) {
            tracing::warn!(error = %e, "Failed to emit session snapshot");
        }
    }
}

async fn listen(mut changes: SessionChanges, dispatch: Arc<Dispatch>) {
    while let Some(state) = changes.next().await {
        let sequence = dispatch.next_sequence();
        let dispatch = dispatch.clone();
        tokio::spawn(async move { dispatch.handle(sequence, state).await });
    }
    tracing::debug!("Session change stream ended");
}

/// Bridges provider session changes to an auth event sink.
pub struct SessionObserver {
    provider: Arc<dyn IdentityProvider>,
    resolver: ClaimsResolver,
    ordering: EventOrdering,
    registration: Mutex<Option<Registration>>,
}

impl SessionObserver {
    pub fn new(provider: Arc<dyn IdentityProvider>, ordering: EventOrdering) -> Self {
        let resolver = ClaimsResolver::new(provider.clone());
        Self {
            provider,
            resolver,
            ordering,
            registration: Mutex::new(None),
        }
    }

    fn registration(&self) -> MutexGuard<'_, Option<Registration>> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start forwarding session changes to `sink`, replacing any previous
    /// sink and subscription. Must be called inside a tokio runtime.
    ///
    /// Notifications already being handled for a replaced sink may still
    /// reach it.
    pub fn register(&self, sink: Arc<dyn AuthEventSink>) {
        let dispatch = Arc::new(Dispatch {
            resolver: self.resolver.clone(),
            sink,
            ordering: self.ordering,
            issued: AtomicU64::new(0),
            newest_emitted: AtomicU64::new(0),
        });

        let mut registration = self.registration();
        if let Some(previous) = registration.take() {
            tracing::debug!("Replacing auth event sink");
            previous.listener.abort();
        }

        let changes = self.provider.subscribe_to_changes();
        let listener = tokio::spawn(listen(changes, dispatch.clone()));
        *registration = Some(Registration { dispatch, listener });

        tracing::info!(ordering = %self.ordering, "Auth event sink registered");
    }

    /// Stop forwarding and release the provider subscription.
    pub fn unregister(&self) {
        if let Some(previous) = self.registration().take() {
            previous.listener.abort();
            tracing::info!("Auth event sink unregistered");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration().is_some()
    }

    /// Take a place in the emission sequence for a snapshot built outside
    /// the change stream. Reserve before reading the state the snapshot is
    /// built from, so later notifications still win.
    pub(crate) fn reserve(&self) -> EmitSlot {
        let dispatch = self.registration().as_ref().map(|r| r.dispatch.clone());
        let sequence = dispatch.as_ref().map_or(0, |d| d.next_sequence());
        EmitSlot { dispatch, sequence }
    }
}

/// A reserved position in the current registration's emission sequence.
pub(crate) struct EmitSlot {
    dispatch: Option<Arc<Dispatch>>,
    sequence: u64,
}

impl EmitSlot {
    /// Emit at the reserved position. Without a registered sink the event
    /// is dropped.
    pub(crate) fn emit(self, event: AuthEvent) -> Result<(), AuthError> {
        match self.dispatch {
            Some(dispatch) => dispatch.deliver(self.sequence, event).map_err(AuthError::from),
            None => {
                tracing::debug!(event = event.name(), "No auth event sink registered, dropping event");
                Ok(())
            }
        }
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        if let Some(previous) = self.registration().take() {
            previous.listener.abort();
        }
    }
}
