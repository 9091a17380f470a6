//! End-to-end session synchronization tests
//!
//! Every test drives one or more `AuthSession`s over the mock identity
//! provider and asserts on what subscribers actually receive.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sessionsync_auth::{AuthError, AuthSession};
use sessionsync_common::EventOrdering;
use sessionsync_events::ChannelEmitter;
use sessionsync_identity::mock::MockIdentityBackend;
use sessionsync_identity::IdentityProvider;

use common::{alice, bob, claims, uid_of, TestContext, WAIT};

#[test_log::test(tokio::test)]
async fn test_sign_in_emits_exactly_one_snapshot() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("pro"));
    let ctx = TestContext::new(backend);
    assert!(ctx.register().await.user().is_none());

    ctx.provider.simulate_sign_in(alice());

    let events = ctx.settled_events(2).await;
    assert_eq!(events.len(), 2);
    let user = events[1].user().expect("sign-in snapshot");
    assert_eq!(user.uid, "alice-uid");
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    assert!(user.email_verified);
    assert_eq!(user.display_name.as_deref(), Some("Alice"));
    assert_eq!(user.claim("plan"), Some(&json!("pro")));
}

#[test_log::test(tokio::test)]
async fn test_sign_out_emits_exactly_one_null_snapshot() {
    let backend = MockIdentityBackend::new();
    let ctx = TestContext::new(backend);
    ctx.provider.simulate_sign_in(bob());
    assert_eq!(uid_of(&ctx.register().await), Some("bob-uid"));

    ctx.session.sign_out().await.unwrap();

    let events = ctx.settled_events(2).await;
    assert_eq!(events.len(), 2);
    assert!(events[1].user().is_none());
    assert!(ctx.session.get_current_user().await.unwrap().is_none());
}

#[test_log::test(tokio::test)]
async fn test_unverified_email_is_reported_false() {
    let ctx = TestContext::new(MockIdentityBackend::new());
    ctx.provider.simulate_sign_in(bob());

    let user = ctx.session.get_current_user().await.unwrap().unwrap();

    assert!(!user.email_verified);
    assert!(user.display_name.is_none());
}

#[test_log::test(tokio::test)]
async fn test_current_user_matches_last_emitted_snapshot() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("free"));
    let ctx = TestContext::new(backend);
    ctx.register().await;

    ctx.provider.simulate_sign_in(alice());
    let events = ctx.settled_events(2).await;

    let current = ctx.session.get_current_user().await.unwrap();
    assert_eq!(current.as_ref(), events[1].user());
}

#[test_log::test(tokio::test)]
async fn test_login_token_moves_session_to_second_context() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("team"));
    let origin = TestContext::new(backend.clone());
    let other = TestContext::new(backend.clone());
    origin.provider.simulate_sign_in(alice());
    origin.register().await;
    assert!(other.register().await.user().is_none());

    let token = origin.session.generate_login_token().await.unwrap();
    other.session.login_with_token(&token).await.unwrap();

    let events = other.settled_events(2).await;
    assert_eq!(events.len(), 2);
    let user = events[1].user().expect("session established by token");
    assert_eq!(user.uid, "alice-uid");
    assert_eq!(user.claim("plan"), Some(&json!("team")));

    // The origin context is untouched by the exchange.
    assert_eq!(origin.sink.count(), 1);
    assert_eq!(backend.outstanding_login_tokens(), 0);
}

#[test_log::test(tokio::test)]
async fn test_login_token_cannot_be_redeemed_twice() {
    let backend = MockIdentityBackend::new();
    let origin = TestContext::new(backend.clone());
    let first = TestContext::new(backend.clone());
    let second = TestContext::new(backend);
    origin.provider.simulate_sign_in(alice());

    let token = origin.session.generate_login_token().await.unwrap();
    first.session.login_with_token(&token).await.unwrap();
    let replay = second.session.login_with_token(&token).await;

    assert!(matches!(replay, Err(AuthError::InvalidToken(_))));
    assert!(second.provider.current_session().is_none());
}

#[test_log::test(tokio::test)]
async fn test_generate_login_token_after_sign_out_fails() {
    let ctx = TestContext::new(MockIdentityBackend::new());
    ctx.provider.simulate_sign_in(alice());
    ctx.session.sign_out().await.unwrap();

    let result = ctx.session.generate_login_token().await;

    assert!(matches!(result, Err(AuthError::NoActiveSession)));
    assert!(ctx.provider.function_calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_refresh_delivers_new_claims_to_subscriber() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("free"));
    let ctx = TestContext::new(backend.clone());
    ctx.provider.simulate_sign_in(alice());
    ctx.register().await;

    backend.set_claims("alice-uid", claims("pro"));
    // Without a forced refresh the cached token still carries the old claims.
    let cached = ctx.session.get_user_claims(false).await.unwrap().unwrap();
    assert_eq!(cached["plan"], "free");

    let refreshed = ctx.session.refresh().await.unwrap();

    assert_eq!(refreshed.claim("plan"), Some(&json!("pro")));
    let events = ctx.settled_events(2).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].user(), Some(&refreshed));
    assert_eq!(
        ctx.session.get_current_user().await.unwrap().as_ref(),
        Some(&refreshed)
    );
}

#[test_log::test(tokio::test)]
async fn test_overlapping_transitions_can_arrive_out_of_order() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("pro"));
    let ctx = TestContext::with_ordering(backend, EventOrdering::Unordered);
    ctx.register().await;
    ctx.provider.behavior().set_claims_delay_ms(200);

    ctx.provider.simulate_sign_in(alice());
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.provider.simulate_sign_out();

    let events = ctx.sink.wait_for(3, WAIT).await;

    // The sign-out overtakes the slow claims lookup for the sign-in.
    assert_eq!(events.len(), 3);
    assert!(events[1].user().is_none());
    assert_eq!(uid_of(&events[2]), Some("alice-uid"));
    assert!(ctx.provider.current_session().is_none());
}

#[test_log::test(tokio::test)]
async fn test_supersede_keeps_last_transition_last() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("pro"));
    let ctx = TestContext::with_ordering(backend, EventOrdering::Supersede);
    ctx.register().await;
    ctx.provider.behavior().set_claims_delay_ms(200);

    ctx.provider.simulate_sign_in(alice());
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.provider.simulate_sign_out();

    ctx.sink.wait_for(2, WAIT).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = ctx.sink.recorded_events();
    assert_eq!(events.len(), 2);
    assert!(events.last().and_then(|e| e.user()).is_none());
}

#[test_log::test(tokio::test)]
async fn test_unregister_then_register_replays_current_state() {
    let backend = MockIdentityBackend::new();
    let ctx = TestContext::new(backend);
    ctx.register().await;

    ctx.session.unregister_auth_emitter();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ctx.provider.subscriber_count(), 0);

    ctx.provider.simulate_sign_in(bob());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.sink.count(), 1);

    ctx.sink.reset();
    assert_eq!(uid_of(&ctx.register().await), Some("bob-uid"));
}

#[test_log::test(tokio::test)]
async fn test_channel_emitter_carries_events_between_contexts() {
    let backend = MockIdentityBackend::new();
    backend.add_user(alice(), claims("pro"));
    let provider = Arc::new(sessionsync_identity::mock::MockIdentityProvider::with_backend(
        backend,
    ));
    let session = AuthSession::new(provider.clone());
    let (emitter, mut listener) = ChannelEmitter::pair();
    session.register_auth_emitter(Arc::new(emitter));

    let initial = tokio::time::timeout(WAIT, listener.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(initial.name(), "onAuthStateChanged");
    assert!(initial.user().is_none());

    provider.simulate_sign_in(alice());
    let signed_in = tokio::time::timeout(WAIT, listener.recv())
        .await
        .unwrap()
        .unwrap();
    let user = signed_in.user().unwrap();
    assert_eq!(user.uid, "alice-uid");
    assert_eq!(user.claim("plan"), Some(&json!("pro")));

    provider.simulate_sign_out();
    let signed_out = tokio::time::timeout(WAIT, listener.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(signed_out.user().is_none());
    assert!(listener.try_recv().is_none());
}
