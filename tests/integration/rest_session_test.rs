//! Session core over the REST identity provider
//!
//! Runs `AuthSession` against a wiremock stand-in for the identity
//! service, covering the HTTP path end to end: custom token sign-in,
//! account lookup, forced token refresh, and callable functions.

mod common;

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use sessionsync_auth::{AuthError, AuthSession};
use sessionsync_events::MockEventSink;
use sessionsync_identity::rest::RestIdentityProvider;
use sessionsync_identity::IdentityConfig;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::WAIT;

const UID: &str = "rest-user";

fn id_token(plan: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": UID,
        "user_id": UID,
        "plan": plan,
        "iat": now,
        "exp": now + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"integration-signing-secret"),
    )
    .unwrap()
}

fn session_for(server: &MockServer) -> AuthSession {
    let provider = RestIdentityProvider::new(IdentityConfig {
        provider: "rest".to_string(),
        api_key: "integration-key".to_string(),
        auth_url: server.uri(),
        token_url: server.uri(),
        functions_url: format!("{}/functions", server.uri()),
    });
    AuthSession::new(Arc::new(provider))
}

async fn mount_accounts(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/accounts:signInWithCustomToken"))
        .and(body_partial_json(json!({"token": "login-token-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": id_token("free"),
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts:signInWithCustomToken"))
        .and(body_partial_json(json!({"token": "stale-token"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "INVALID_CUSTOM_TOKEN", "status": "INVALID_ARGUMENT"}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "localId": UID,
                "email": "rest@example.com",
                "emailVerified": true,
                "displayName": "Rest User"
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_function(server: &MockServer, name: &str, result: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/functions/{}", name)))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_login_with_token_emits_snapshot_with_token_claims() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    let session = session_for(&server);
    let sink = MockEventSink::new();
    session.register_auth_emitter(Arc::new(sink.clone()));
    sink.wait_for(1, WAIT).await;

    session.login_with_token("login-token-1").await.unwrap();

    let events = sink.wait_for(2, WAIT).await;
    assert_eq!(events.len(), 2);
    let user = events[1].user().expect("signed in snapshot");
    assert_eq!(user.uid, UID);
    assert_eq!(user.email.as_deref(), Some("rest@example.com"));
    assert!(user.email_verified);
    assert_eq!(user.display_name.as_deref(), Some("Rest User"));
    assert_eq!(user.claim("plan"), Some(&json!("free")));
}

#[test_log::test(tokio::test)]
async fn test_login_with_rejected_token_leaves_session_empty() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    let session = session_for(&server);

    let result = session.login_with_token("stale-token").await;

    match result {
        Err(AuthError::InvalidToken(message)) => assert!(message.contains("INVALID_CUSTOM_TOKEN")),
        other => panic!("expected invalid token, got {:?}", other),
    }
    assert!(session.get_current_user().await.unwrap().is_none());
}

#[test_log::test(tokio::test)]
async fn test_generate_login_token_calls_remote_function() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_function(&server, "getCustomLoginToken", json!("minted-login-token")).await;
    let session = session_for(&server);
    session.login_with_token("login-token-1").await.unwrap();

    let token = session.generate_login_token().await.unwrap();

    assert_eq!(token, "minted-login-token");
}

#[test_log::test(tokio::test)]
async fn test_generate_login_token_rejects_empty_result() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_function(&server, "getCustomLoginToken", Value::Null).await;
    let session = session_for(&server);
    session.login_with_token("login-token-1").await.unwrap();

    let result = session.generate_login_token().await;

    assert!(matches!(result, Err(AuthError::InvalidResponse(_))));
}

#[test_log::test(tokio::test)]
async fn test_refresh_reloads_and_forces_new_token() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    mount_function(&server, "refreshUserClaims", json!({"uid": UID})).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_partial_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token("pro"),
            "refresh_token": "refresh-2",
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let session = session_for(&server);
    let sink = MockEventSink::new();
    session.login_with_token("login-token-1").await.unwrap();
    session.register_auth_emitter(Arc::new(sink.clone()));
    sink.wait_for(1, WAIT).await;

    let refreshed = session.refresh().await.unwrap();

    assert_eq!(refreshed.uid, UID);
    assert_eq!(refreshed.claim("plan"), Some(&json!("pro")));
    let events = sink.wait_for(2, WAIT).await;
    assert_eq!(events[1].user(), Some(&refreshed));
    assert_eq!(
        session.get_user_claims(false).await.unwrap().unwrap()["plan"],
        "pro"
    );
}

#[test_log::test(tokio::test)]
async fn test_sign_out_ends_rest_session() {
    let server = MockServer::start().await;
    mount_accounts(&server).await;
    let session = session_for(&server);
    session.login_with_token("login-token-1").await.unwrap();
    let sink = MockEventSink::new();
    session.register_auth_emitter(Arc::new(sink.clone()));
    sink.wait_for(1, WAIT).await;

    session.sign_out().await.unwrap();

    let events = sink.wait_for(2, WAIT).await;
    assert!(events[1].user().is_none());
    assert!(matches!(
        session.generate_login_token().await,
        Err(AuthError::NoActiveSession)
    ));
}

#[test_log::test(tokio::test)]
async fn test_refresh_of_deleted_account_signs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accounts:signInWithCustomToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": id_token("free"),
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{"localId": UID}]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/accounts:lookup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "USER_NOT_FOUND", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;
    mount_function(&server, "refreshUserClaims", json!({"uid": UID})).await;
    let session = session_for(&server);
    session.login_with_token("login-token-1").await.unwrap();
    let sink = MockEventSink::new();
    session.register_auth_emitter(Arc::new(sink.clone()));
    sink.wait_for(1, WAIT).await;

    let err = session.refresh().await.unwrap_err();

    assert_eq!(err.code(), "NO_ACTIVE_SESSION");
    let events = sink.wait_for(2, WAIT).await;
    assert_eq!(events.len(), 2);
    assert!(events[1].user().is_none());
    assert!(session.get_current_user().await.unwrap().is_none());
}
