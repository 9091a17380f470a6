//! Shared fixtures for the session sync integration tests
//!
//! A `TestContext` is one execution context: its own provider, its own
//! `AuthSession`, and a sink recording everything the session emits.
//! Contexts built from the same `MockIdentityBackend` see the same
//! accounts, which is what lets a login token cross between them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sessionsync_auth::AuthSession;
use sessionsync_common::{Claims, EventOrdering};
use sessionsync_events::{AuthEvent, MockEventSink};
use sessionsync_identity::mock::{MockIdentityBackend, MockIdentityProvider};
use sessionsync_identity::ProviderUser;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct TestContext {
    pub provider: Arc<MockIdentityProvider>,
    pub session: AuthSession,
    pub sink: MockEventSink,
}

impl TestContext {
    pub fn new(backend: Arc<MockIdentityBackend>) -> Self {
        Self::with_ordering(backend, EventOrdering::Unordered)
    }

    pub fn with_ordering(backend: Arc<MockIdentityBackend>, ordering: EventOrdering) -> Self {
        let provider = Arc::new(MockIdentityProvider::with_backend(backend));
        let session = AuthSession::with_event_ordering(provider.clone(), ordering);
        Self {
            provider,
            session,
            sink: MockEventSink::new(),
        }
    }

    /// Register the recording sink and wait for the initial snapshot.
    pub async fn register(&self) -> AuthEvent {
        self.session.register_auth_emitter(Arc::new(self.sink.clone()));
        let events = self.sink.wait_for(1, WAIT).await;
        assert_eq!(events.len(), 1, "registration must replay the current state");
        events[0].clone()
    }

    /// Wait until `count` events arrive, then give stragglers a moment so
    /// an extra emission would be caught.
    pub async fn settled_events(&self, count: usize) -> Vec<AuthEvent> {
        self.sink.wait_for(count, WAIT).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.sink.recorded_events()
    }
}

pub fn alice() -> ProviderUser {
    ProviderUser::new("alice-uid")
        .with_email("alice@example.com", true)
        .with_display_name("Alice")
}

pub fn bob() -> ProviderUser {
    ProviderUser::new("bob-uid").with_email("bob@example.com", false)
}

pub fn claims(plan: &str) -> Claims {
    let mut claims = Claims::new();
    claims.insert("plan".to_string(), json!(plan));
    claims
}

pub fn uid_of(event: &AuthEvent) -> Option<&str> {
    event.user().map(|u| u.uid.as_str())
}
